//! Architecture encodings
//!
//! Discrete descriptors that select, per node, which predecessor states
//! and which operation kinds are active for a given forward pass. An
//! encoding never owns weights; it only routes through the supernet's
//! pre-built candidate operations.

mod encoding;
mod sample;

pub use encoding::{Architecture, CellArch, NodeGene, OpKind};
pub use sample::{sample_architecture, sample_cell_arch, sample_reduction_cell_arch};
