//! Weight-shared operation primitives
//!
//! The candidate operations a supernet routes through: separable
//! convolutions and pooling with call-time stride, factorized spatial
//! reduction, input-size calibration, and the concat-set-keyed output
//! projection. Tensors are `ndarray::Array4<f64>` in NCHW layout. All
//! modules are built once at network construction; forward calls only
//! select among them.

mod calibrate;
mod combine;
mod conv;
mod drop_path;
mod linear;
mod norm;
mod pool;
mod reduce;
mod sep_conv;

pub use calibrate::CalibrateSize;
pub use combine::WsCombineConv;
pub use conv::{conv2d, Conv2d, ReluConvBn};
pub use drop_path::{apply_drop_path, dropout, effective_keep_prob};
pub use linear::Linear;
pub use norm::BatchNorm2d;
pub use pool::{avg_pool2d, global_avg_pool, max_pool2d, AvgPool2d, MaxPool2d};
pub use reduce::FactorizedReduce;
pub use sep_conv::WsSepConv;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Spatial/channel descriptor of a feature map, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Shape after spatial reduction by `stride` with `channels` channels
    pub fn reduced(self, stride: usize, channels: usize) -> Self {
        Self {
            height: self.height / stride,
            width: self.width / stride,
            channels,
        }
    }
}

/// Elementwise ReLU
pub fn relu(x: &Array4<f64>) -> Array4<f64> {
    x.mapv(|v| v.max(0.0))
}

/// Uniform init scale from fan-in and fan-out
pub(crate) fn init_scale(fan_in: usize, fan_out: usize) -> f64 {
    (2.0 / (fan_in + fan_out) as f64).sqrt()
}
