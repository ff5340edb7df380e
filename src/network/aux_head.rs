//! Training-time auxiliary classifier

use ndarray::{Array2, Array4};
use rand::Rng;

use crate::ops::{avg_pool2d, global_avg_pool, relu, BatchNorm2d, Conv2d, Linear, Shape};

/// Secondary classifier attached after the second reduction point
///
/// Injects extra gradient signal during training; never used at inference.
/// ReLU -> 5x5/stride-3 average pool -> 1x1 conv to 128 -> BN -> ReLU ->
/// full-spatial conv to 768 -> BN -> ReLU -> linear.
#[derive(Debug, Clone)]
pub struct AuxHead {
    proj: Conv2d,
    bn1: BatchNorm2d,
    conv: Conv2d,
    bn2: BatchNorm2d,
    classifier: Linear,
}

impl AuxHead {
    pub fn new(input: Shape, num_classes: usize, rng: &mut impl Rng) -> Self {
        assert!(input.height >= 5, "aux head needs spatial size >= 5, got {}", input.height);
        let pooled = (input.height - 5) / 3 + 1;
        Self {
            proj: Conv2d::new(input.channels, 128, 1, 1, 0, rng),
            bn1: BatchNorm2d::new(128),
            conv: Conv2d::new(128, 768, pooled, 1, 0, rng),
            bn2: BatchNorm2d::new(768),
            classifier: Linear::new(768, num_classes, rng),
        }
    }

    pub fn forward(&mut self, x: &Array4<f64>) -> Array2<f64> {
        let out = relu(x);
        let out = avg_pool2d(&out, 5, 3, 0);
        let out = self.proj.forward(&out);
        let out = self.bn1.forward(&out);
        let out = relu(&out);
        let out = self.conv.forward(&out);
        let out = self.bn2.forward(&out);
        let out = relu(&out);
        let flat = global_avg_pool(&out);
        self.classifier.forward(&flat)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.bn1.set_training(training);
        self.bn2.set_training(training);
    }

    pub fn num_params(&self) -> usize {
        self.proj.num_params()
            + self.bn1.num_params()
            + self.conv.num_params()
            + self.bn2.num_params()
            + self.classifier.num_params()
    }
}
