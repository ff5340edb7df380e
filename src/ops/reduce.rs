//! Factorized spatial reduction

use ndarray::{s, Array2, Array4, Axis};
use rand::Rng;

use super::conv::conv1x1;
use super::{init_scale, relu, BatchNorm2d};

/// Halve the spatial resolution without losing information to a single
/// strided window: two parallel 1x1 stride-2 convolutions, the second on a
/// one-pixel-shifted view, concatenated along channels and normalized.
///
/// Tied to a specific input's channel count at construction, which is why a
/// stride-2 node needs one instance per possible cell-input slot.
#[derive(Debug, Clone)]
pub struct FactorizedReduce {
    w1: Array2<f64>,
    w2: Array2<f64>,
    bn: BatchNorm2d,
}

impl FactorizedReduce {
    pub fn new(in_channels: usize, out_channels: usize, rng: &mut impl Rng) -> Self {
        assert!(out_channels % 2 == 0, "factorized reduce needs an even channel count");
        let half = out_channels / 2;
        let scale = init_scale(in_channels, half);
        let w1 = Array2::from_shape_fn((half, in_channels), |_| (rng.gen::<f64>() - 0.5) * scale);
        let w2 = Array2::from_shape_fn((half, in_channels), |_| (rng.gen::<f64>() - 0.5) * scale);
        Self {
            w1,
            w2,
            bn: BatchNorm2d::new(out_channels),
        }
    }

    pub fn forward(&mut self, x: &Array4<f64>) -> Array4<f64> {
        let (_, _, h, w) = x.dim();
        assert!(h % 2 == 0 && w % 2 == 0, "reduction requires even spatial dims, got {h}x{w}");
        let x = relu(x);
        let p1 = conv1x1(&x, &self.w1, 2);
        let shifted = x.slice(s![.., .., 1.., 1..]).to_owned();
        let p2 = conv1x1(&shifted, &self.w2, 2);
        let out = ndarray::concatenate(Axis(1), &[p1.view(), p2.view()])
            .expect("reduction paths share spatial dims");
        self.bn.forward(&out)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.bn.set_training(training);
    }

    pub fn num_params(&self) -> usize {
        self.w1.len() + self.w2.len() + self.bn.num_params()
    }
}
