//! Random sampling of valid architecture encodings
//!
//! Useful as a search baseline and for exercising the supernet in tests.

use rand::Rng;

use super::encoding::{Architecture, CellArch, OpKind};

/// Sample a uniformly random valid cell encoding for `nodes` nodes
///
/// Suitable for normal cells. Reduction cells additionally require both
/// cell inputs to be consumed: an untouched input stays at the
/// pre-reduction resolution and cannot join the concat set. Use
/// [`sample_reduction_cell_arch`] for those.
pub fn sample_cell_arch(nodes: usize, rng: &mut impl Rng) -> CellArch {
    let mut genes = Vec::with_capacity(4 * nodes);
    for i in 0..nodes {
        // both branches draw a predecessor < i + 2 and any op kind
        genes.push(rng.gen_range(0..i + 2));
        genes.push(rng.gen_range(0..OpKind::COUNT));
        genes.push(rng.gen_range(0..i + 2));
        genes.push(rng.gen_range(0..OpKind::COUNT));
    }
    CellArch::new(genes)
}

/// Sample a valid reduction-cell encoding
///
/// Uniform over the encodings that consume both cell inputs, by rejection.
pub fn sample_reduction_cell_arch(nodes: usize, rng: &mut impl Rng) -> CellArch {
    loop {
        let arch = sample_cell_arch(nodes, rng);
        if arch.consumes(0) && arch.consumes(1) {
            return arch;
        }
    }
}

/// Sample a `(normal, reduction)` encoding pair
pub fn sample_architecture(nodes: usize, rng: &mut impl Rng) -> Architecture {
    Architecture::new(
        sample_cell_arch(nodes, rng),
        sample_reduction_cell_arch(nodes, rng),
    )
}
