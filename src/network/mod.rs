//! Supernet assembly: nodes, cells, and the macro-network
//!
//! A `NasNetwork` is a stem, a stack of [`Cell`]s with two reduction
//! points, an optional auxiliary head, and a classifier. Cells are DAGs
//! of [`Node`]s; every candidate operation is built once and shared by
//! all architecture encodings routed through the network.

mod aux_head;
mod cell;
mod model;
mod node;

pub use aux_head::AuxHead;
pub use cell::Cell;
pub use model::{NasNetwork, NetworkConfig};
pub use node::Node;
