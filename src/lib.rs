//! Weight-shared supernet for cell-based neural architecture search
//!
//! One set of candidate operations is instantiated at construction; each
//! forward call routes through them as directed by a discrete architecture
//! encoding, so every sampled architecture trains the same shared weights.
//!
//! # Modules
//!
//! - [`arch`] - Discrete architecture encodings and random sampling
//! - [`ops`] - Candidate operation primitives over `ndarray` tensors
//! - [`network`] - Node, cell, and macro-network assembly
//! - [`error`] - Error types

pub mod arch;
pub mod error;
pub mod network;
pub mod ops;

pub use error::{Result, SupernetError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, SupernetError};

    // Architecture encodings
    pub use crate::arch::{sample_architecture, Architecture, CellArch, NodeGene, OpKind};

    // Network assembly
    pub use crate::network::{NasNetwork, NetworkConfig};

    // Tensor helpers
    pub use crate::ops::Shape;
}
