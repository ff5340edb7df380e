//! Discrete architecture encoding types

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupernetError};

/// Operation kinds selectable on a node branch
///
/// `Identity` is identity at stride 1 and routes through a fixed
/// factorized-reduction module at stride 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// 3x3 separable convolution
    SepConv3,
    /// 5x5 separable convolution
    SepConv5,
    /// 3x3 average pooling
    AvgPool,
    /// 3x3 max pooling
    MaxPool,
    /// Identity, or factorized reduction when the branch stride is 2
    Identity,
}

impl OpKind {
    /// Number of operation kinds
    pub const COUNT: usize = 5;

    /// Parse an integer op code, rejecting anything outside `0..=4`
    pub fn from_code(code: usize) -> Result<Self> {
        match code {
            0 => Ok(Self::SepConv3),
            1 => Ok(Self::SepConv5),
            2 => Ok(Self::AvgPool),
            3 => Ok(Self::MaxPool),
            4 => Ok(Self::Identity),
            _ => Err(SupernetError::InvalidOpCode { code }),
        }
    }

    /// Parse an integer op code, panicking on invalid input
    ///
    /// Invalid codes indicate a caller defect (a malfunctioning search
    /// controller) and must surface immediately.
    pub fn decode(code: usize) -> Self {
        match Self::from_code(code) {
            Ok(op) => op,
            Err(e) => panic!("{e}"),
        }
    }

    /// Integer code of this operation kind
    pub fn code(self) -> usize {
        match self {
            Self::SepConv3 => 0,
            Self::SepConv5 => 1,
            Self::AvgPool => 2,
            Self::MaxPool => 3,
            Self::Identity => 4,
        }
    }
}

/// One node's `(x_id, x_op, y_id, y_op)` 4-tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeGene {
    pub x_id: usize,
    pub x_op: OpKind,
    pub y_id: usize,
    pub y_op: OpKind,
}

/// Architecture encoding for a single cell
///
/// A flat integer sequence of length `4 * nodes`, grouped per node as
/// `(x_id, x_op, y_id, y_op)`. Predecessor ids 0 and 1 select the cell's
/// two calibrated inputs; ids >= 2 select prior node outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellArch {
    genes: Vec<usize>,
}

impl CellArch {
    pub fn new(genes: Vec<usize>) -> Self {
        Self { genes }
    }

    /// Number of nodes this encoding describes
    pub fn num_nodes(&self) -> usize {
        self.genes.len() / 4
    }

    /// Raw gene sequence
    pub fn genes(&self) -> &[usize] {
        &self.genes
    }

    /// Decode node `i`'s 4-tuple, panicking on invalid op codes
    pub fn gene(&self, i: usize) -> NodeGene {
        let g = &self.genes[4 * i..4 * i + 4];
        NodeGene {
            x_id: g[0],
            x_op: OpKind::decode(g[1]),
            y_id: g[2],
            y_op: OpKind::decode(g[3]),
        }
    }

    /// Whether any node reads state `id` as a predecessor
    pub fn consumes(&self, id: usize) -> bool {
        self.genes.chunks_exact(4).any(|g| g[0] == id || g[2] == id)
    }

    /// Check the range constraints for an encoding of `nodes` nodes
    ///
    /// Enforces the gene count, op codes in `0..=4`, and the no-forward-
    /// reference invariant `x_id, y_id < i + 2` for every node `i`.
    pub fn validate(&self, nodes: usize) -> Result<()> {
        if self.genes.len() != 4 * nodes {
            return Err(SupernetError::GeneCount {
                expected: 4 * nodes,
                actual: self.genes.len(),
            });
        }
        for i in 0..nodes {
            let g = &self.genes[4 * i..4 * i + 4];
            let limit = i + 2;
            for &id in [g[0], g[2]].iter() {
                if id >= limit {
                    return Err(SupernetError::InvalidPredecessor { node: i, id, limit });
                }
            }
            OpKind::from_code(g[1])?;
            OpKind::from_code(g[3])?;
        }
        Ok(())
    }
}

/// The `(normal, reduction)` encoding pair a network forward consumes
///
/// Every cell reads whichever half matches its own reduction flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub normal: CellArch,
    pub reduction: CellArch,
}

impl Architecture {
    pub fn new(normal: CellArch, reduction: CellArch) -> Self {
        Self { normal, reduction }
    }

    /// Validate both halves against the supernet's node count
    pub fn validate(&self, nodes: usize) -> Result<()> {
        self.normal.validate(nodes)?;
        self.reduction.validate(nodes)
    }
}
