//! Pooling primitives with call-time stride

use ndarray::{Array2, Array4};

/// Average pooling with zero padding; padded positions count toward the
/// divisor
pub fn avg_pool2d(input: &Array4<f64>, kernel: usize, stride: usize, padding: usize) -> Array4<f64> {
    let (b, c, h, w) = input.dim();
    assert!(h + 2 * padding >= kernel && w + 2 * padding >= kernel, "kernel larger than padded input");
    let oh = (h + 2 * padding - kernel) / stride + 1;
    let ow = (w + 2 * padding - kernel) / stride + 1;
    let divisor = (kernel * kernel) as f64;
    let mut out = Array4::zeros((b, c, oh, ow));
    for bi in 0..b {
        for ci in 0..c {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = 0.0;
                    for ky in 0..kernel {
                        for kx in 0..kernel {
                            let y = (oy * stride + ky) as isize - padding as isize;
                            let x = (ox * stride + kx) as isize - padding as isize;
                            if y >= 0 && x >= 0 && (y as usize) < h && (x as usize) < w {
                                acc += input[[bi, ci, y as usize, x as usize]];
                            }
                        }
                    }
                    out[[bi, ci, oy, ox]] = acc / divisor;
                }
            }
        }
    }
    out
}

/// Max pooling with zero padding (padded positions are ignored)
pub fn max_pool2d(input: &Array4<f64>, kernel: usize, stride: usize, padding: usize) -> Array4<f64> {
    let (b, c, h, w) = input.dim();
    assert!(h + 2 * padding >= kernel && w + 2 * padding >= kernel, "kernel larger than padded input");
    let oh = (h + 2 * padding - kernel) / stride + 1;
    let ow = (w + 2 * padding - kernel) / stride + 1;
    let mut out = Array4::zeros((b, c, oh, ow));
    for bi in 0..b {
        for ci in 0..c {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut best = f64::NEG_INFINITY;
                    for ky in 0..kernel {
                        for kx in 0..kernel {
                            let y = (oy * stride + ky) as isize - padding as isize;
                            let x = (ox * stride + kx) as isize - padding as isize;
                            if y >= 0 && x >= 0 && (y as usize) < h && (x as usize) < w {
                                best = best.max(input[[bi, ci, y as usize, x as usize]]);
                            }
                        }
                    }
                    out[[bi, ci, oy, ox]] = best;
                }
            }
        }
    }
    out
}

/// Reduce each feature map to a single value by averaging
pub fn global_avg_pool(input: &Array4<f64>) -> Array2<f64> {
    let (b, c, _, _) = input.dim();
    let mut out = Array2::zeros((b, c));
    for bi in 0..b {
        for ci in 0..c {
            let lane = input.index_axis(ndarray::Axis(0), bi);
            let lane = lane.index_axis(ndarray::Axis(0), ci);
            out[[bi, ci]] = lane.mean().unwrap_or(0.0);
        }
    }
    out
}

/// 3x3 average pooling candidate; stride is supplied per call
#[derive(Debug, Clone)]
pub struct AvgPool2d {
    kernel: usize,
    padding: usize,
}

impl AvgPool2d {
    pub fn new(kernel: usize, padding: usize) -> Self {
        Self { kernel, padding }
    }

    pub fn apply(&self, x: &Array4<f64>, stride: usize) -> Array4<f64> {
        avg_pool2d(x, self.kernel, stride, self.padding)
    }
}

/// 3x3 max pooling candidate; stride is supplied per call
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel: usize,
    padding: usize,
}

impl MaxPool2d {
    pub fn new(kernel: usize, padding: usize) -> Self {
        Self { kernel, padding }
    }

    pub fn apply(&self, x: &Array4<f64>, stride: usize) -> Array4<f64> {
        max_pool2d(x, self.kernel, stride, self.padding)
    }
}
