//! Weight-slot separable convolution candidate

use ndarray::{Array2, Array3, Array4};
use rand::Rng;

use super::conv::{conv1x1, depthwise_conv2d};
use super::{init_scale, relu, BatchNorm2d};

/// Separable convolution with one parameter set per possible input slot
///
/// The candidate owns `num_slots` parallel depthwise/pointwise weight sets
/// and selects one by predecessor slot at call time, so the same physical
/// module serves every architecture that picks this op kind on this branch
/// while keeping per-predecessor weights distinct. Two conv stages; the
/// first carries the requested stride.
#[derive(Debug, Clone)]
pub struct WsSepConv {
    kernel: usize,
    padding: usize,
    pub(crate) dw1: Vec<Array3<f64>>,
    pub(crate) pw1: Vec<Array2<f64>>,
    pub(crate) dw2: Vec<Array3<f64>>,
    pub(crate) pw2: Vec<Array2<f64>>,
    bn1: BatchNorm2d,
    bn2: BatchNorm2d,
}

impl WsSepConv {
    pub fn new(num_slots: usize, channels: usize, kernel: usize, padding: usize, rng: &mut impl Rng) -> Self {
        let dw_scale = init_scale(kernel * kernel, kernel * kernel);
        let pw_scale = init_scale(channels, channels);
        let mut dw1 = Vec::with_capacity(num_slots);
        let mut pw1 = Vec::with_capacity(num_slots);
        let mut dw2 = Vec::with_capacity(num_slots);
        let mut pw2 = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            dw1.push(Array3::from_shape_fn((channels, kernel, kernel), |_| {
                (rng.gen::<f64>() - 0.5) * dw_scale
            }));
            pw1.push(Array2::from_shape_fn((channels, channels), |_| {
                (rng.gen::<f64>() - 0.5) * pw_scale
            }));
            dw2.push(Array3::from_shape_fn((channels, kernel, kernel), |_| {
                (rng.gen::<f64>() - 0.5) * dw_scale
            }));
            pw2.push(Array2::from_shape_fn((channels, channels), |_| {
                (rng.gen::<f64>() - 0.5) * pw_scale
            }));
        }
        Self {
            kernel,
            padding,
            dw1,
            pw1,
            dw2,
            pw2,
            bn1: BatchNorm2d::new(channels),
            bn2: BatchNorm2d::new(channels),
        }
    }

    pub fn num_slots(&self) -> usize {
        self.dw1.len()
    }

    /// Apply the candidate using the weight set of `slot`
    pub fn apply(&mut self, x: &Array4<f64>, slot: usize, stride: usize) -> Array4<f64> {
        assert!(slot < self.num_slots(), "weight slot {slot} out of range");
        assert!(stride == 1 || stride == 2, "stride must be 1 or 2, got {stride}");
        let out = relu(x);
        let out = depthwise_conv2d(&out, &self.dw1[slot], stride, self.padding);
        let out = conv1x1(&out, &self.pw1[slot], 1);
        let out = self.bn1.forward(&out);
        let out = relu(&out);
        let out = depthwise_conv2d(&out, &self.dw2[slot], 1, self.padding);
        let out = conv1x1(&out, &self.pw2[slot], 1);
        self.bn2.forward(&out)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.bn1.set_training(training);
        self.bn2.set_training(training);
    }

    pub fn num_params(&self) -> usize {
        let slots: usize = self
            .dw1
            .iter()
            .chain(self.dw2.iter())
            .map(|w| w.len())
            .sum::<usize>()
            + self.pw1.iter().chain(self.pw2.iter()).map(|w| w.len()).sum::<usize>();
        slots + self.bn1.num_params() + self.bn2.num_params()
    }
}
