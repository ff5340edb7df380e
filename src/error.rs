//! Error types for the supernet crate

use thiserror::Error;

/// Result type alias for supernet operations
pub type Result<T> = std::result::Result<T, SupernetError>;

/// Main error type for the supernet crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupernetError {
    #[error("invalid op code {code}: operation codes must be in 0..=4")]
    InvalidOpCode { code: usize },

    #[error("invalid predecessor {id} for node {node}: must be < {limit}")]
    InvalidPredecessor {
        node: usize,
        id: usize,
        limit: usize,
    },

    #[error("architecture has {actual} genes, expected {expected} (4 per node)")]
    GeneCount { expected: usize, actual: usize },

    #[error("invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}
