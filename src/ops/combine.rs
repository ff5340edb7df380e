//! Weight-shared output projection over a concat set

use ndarray::{Array2, Array4, Axis};
use rand::Rng;

use super::conv::conv1x1;
use super::{init_scale, relu, BatchNorm2d};

/// ReLU -> 1x1 conv -> batch norm, with the kernel assembled per call
///
/// Owns one weight slice per state slot. Because the concatenation set
/// varies per architecture, the effective kernel is built at call time by
/// concatenating the slices named by the concat index list, so a state's
/// slice is shared by every architecture that leaves that state
/// unconsumed.
#[derive(Debug, Clone)]
pub struct WsCombineConv {
    slot_channels: usize,
    pub(crate) weights: Vec<Array2<f64>>,
    bn: BatchNorm2d,
}

impl WsCombineConv {
    pub fn new(num_slots: usize, slot_channels: usize, out_channels: usize, rng: &mut impl Rng) -> Self {
        let scale = init_scale(slot_channels, out_channels);
        let weights = (0..num_slots)
            .map(|_| {
                Array2::from_shape_fn((out_channels, slot_channels), |_| {
                    (rng.gen::<f64>() - 0.5) * scale
                })
            })
            .collect();
        Self {
            slot_channels,
            weights,
            bn: BatchNorm2d::new(out_channels),
        }
    }

    /// Project `x` (the concatenated states) back to the working width
    ///
    /// `concat` names which state slots were concatenated, in ascending
    /// order; it selects the weight slices and must match `x`'s channels.
    pub fn forward(&mut self, x: &Array4<f64>, concat: &[usize]) -> Array4<f64> {
        assert!(!concat.is_empty(), "empty concatenation set is invalid");
        assert_eq!(
            x.dim().1,
            concat.len() * self.slot_channels,
            "concatenated input width must match the concat set"
        );
        let views: Vec<_> = concat
            .iter()
            .map(|&i| self.weights[i].view())
            .collect();
        let weight = ndarray::concatenate(Axis(1), &views).expect("slot weights share row count");
        let out = relu(x);
        let out = conv1x1(&out, &weight, 1);
        self.bn.forward(&out)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.bn.set_training(training);
    }

    pub fn num_params(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>() + self.bn.num_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_projects_concat_back_to_working_width() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut op = WsCombineConv::new(4, 4, 4, &mut rng);
        // two concatenated states of 4 channels each
        let x = Array4::from_shape_fn((2, 8, 6, 6), |_| rng.gen::<f64>());
        let out = op.forward(&x, &[1, 3]);
        assert_eq!(out.dim(), (2, 4, 6, 6));
    }

    #[test]
    fn test_concat_set_selects_weight_slices() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut op = WsCombineConv::new(4, 4, 4, &mut rng);
        op.set_training(false);
        let x = Array4::from_shape_fn((1, 8, 4, 4), |_| rng.gen::<f64>());
        let a = op.forward(&x, &[0, 1]);
        let b = op.forward(&x, &[2, 3]);
        assert_ne!(a, b, "different concat sets must route through different slices");
    }

    #[test]
    #[should_panic(expected = "empty concatenation")]
    fn test_empty_concat_fails_fast() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut op = WsCombineConv::new(4, 4, 4, &mut rng);
        let x = Array4::zeros((1, 0, 4, 4));
        op.forward(&x, &[]);
    }
}
