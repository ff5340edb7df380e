//! Direct convolution kernels and convolution modules

use ndarray::{Array2, Array3, Array4, ArrayView3, Axis};
use rand::Rng;
use rayon::prelude::*;

use super::{init_scale, relu, BatchNorm2d};

/// 2D convolution with zero padding, weight layout `[out_c, in_c, k, k]`
///
/// Samples are independent, so the batch axis is processed in parallel.
pub fn conv2d(input: &Array4<f64>, weight: &Array4<f64>, stride: usize, padding: usize) -> Array4<f64> {
    let batch = input.dim().0;
    let outs: Vec<Array3<f64>> = (0..batch)
        .into_par_iter()
        .map(|b| conv2d_single(&input.index_axis(Axis(0), b), weight, stride, padding))
        .collect();
    let views: Vec<_> = outs.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views).expect("per-sample outputs share one shape")
}

fn conv2d_single(
    input: &ArrayView3<f64>,
    weight: &Array4<f64>,
    stride: usize,
    padding: usize,
) -> Array3<f64> {
    let (in_c, h, w) = input.dim();
    let (out_c, w_in_c, k, _) = weight.dim();
    assert_eq!(in_c, w_in_c, "input channels must match kernel channels");
    assert!(h + 2 * padding >= k && w + 2 * padding >= k, "kernel larger than padded input");
    let oh = (h + 2 * padding - k) / stride + 1;
    let ow = (w + 2 * padding - k) / stride + 1;
    let mut out = Array3::zeros((out_c, oh, ow));
    for o in 0..out_c {
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = 0.0;
                for i in 0..in_c {
                    for ky in 0..k {
                        for kx in 0..k {
                            let y = (oy * stride + ky) as isize - padding as isize;
                            let x = (ox * stride + kx) as isize - padding as isize;
                            if y >= 0 && x >= 0 && (y as usize) < h && (x as usize) < w {
                                acc += input[[i, y as usize, x as usize]] * weight[[o, i, ky, kx]];
                            }
                        }
                    }
                }
                out[[o, oy, ox]] = acc;
            }
        }
    }
    out
}

/// Depthwise convolution, weight layout `[c, k, k]`
pub(crate) fn depthwise_conv2d(
    input: &Array4<f64>,
    weight: &Array3<f64>,
    stride: usize,
    padding: usize,
) -> Array4<f64> {
    let batch = input.dim().0;
    let outs: Vec<Array3<f64>> = (0..batch)
        .into_par_iter()
        .map(|b| depthwise_single(&input.index_axis(Axis(0), b), weight, stride, padding))
        .collect();
    let views: Vec<_> = outs.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views).expect("per-sample outputs share one shape")
}

fn depthwise_single(
    input: &ArrayView3<f64>,
    weight: &Array3<f64>,
    stride: usize,
    padding: usize,
) -> Array3<f64> {
    let (in_c, h, w) = input.dim();
    let (w_c, k, _) = weight.dim();
    assert_eq!(in_c, w_c, "depthwise kernel must have one filter per channel");
    assert!(h + 2 * padding >= k && w + 2 * padding >= k, "kernel larger than padded input");
    let oh = (h + 2 * padding - k) / stride + 1;
    let ow = (w + 2 * padding - k) / stride + 1;
    let mut out = Array3::zeros((in_c, oh, ow));
    for c in 0..in_c {
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = 0.0;
                for ky in 0..k {
                    for kx in 0..k {
                        let y = (oy * stride + ky) as isize - padding as isize;
                        let x = (ox * stride + kx) as isize - padding as isize;
                        if y >= 0 && x >= 0 && (y as usize) < h && (x as usize) < w {
                            acc += input[[c, y as usize, x as usize]] * weight[[c, ky, kx]];
                        }
                    }
                }
                out[[c, oy, ox]] = acc;
            }
        }
    }
    out
}

/// 1x1 convolution (channel mixing), weight layout `[out_c, in_c]`
pub(crate) fn conv1x1(input: &Array4<f64>, weight: &Array2<f64>, stride: usize) -> Array4<f64> {
    let (b, in_c, h, w) = input.dim();
    let (out_c, w_in_c) = weight.dim();
    assert_eq!(in_c, w_in_c, "input channels must match kernel channels");
    let oh = (h - 1) / stride + 1;
    let ow = (w - 1) / stride + 1;
    let mut out = Array4::zeros((b, out_c, oh, ow));
    for bi in 0..b {
        for o in 0..out_c {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = 0.0;
                    for i in 0..in_c {
                        acc += input[[bi, i, oy * stride, ox * stride]] * weight[[o, i]];
                    }
                    out[[bi, o, oy, ox]] = acc;
                }
            }
        }
    }
    out
}

/// Plain bias-free 2D convolution module
#[derive(Debug, Clone)]
pub struct Conv2d {
    weight: Array4<f64>,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let scale = init_scale(in_channels * kernel * kernel, out_channels * kernel * kernel);
        let weight = Array4::from_shape_fn((out_channels, in_channels, kernel, kernel), |_| {
            (rng.gen::<f64>() - 0.5) * scale
        });
        Self {
            weight,
            stride,
            padding,
        }
    }

    pub fn forward(&self, x: &Array4<f64>) -> Array4<f64> {
        conv2d(x, &self.weight, self.stride, self.padding)
    }

    pub fn num_params(&self) -> usize {
        self.weight.len()
    }
}

/// ReLU -> 1x1 conv -> batch norm channel projection
#[derive(Debug, Clone)]
pub struct ReluConvBn {
    weight: Array2<f64>,
    bn: BatchNorm2d,
}

impl ReluConvBn {
    pub fn new(in_channels: usize, out_channels: usize, rng: &mut impl Rng) -> Self {
        let scale = init_scale(in_channels, out_channels);
        let weight =
            Array2::from_shape_fn((out_channels, in_channels), |_| (rng.gen::<f64>() - 0.5) * scale);
        Self {
            weight,
            bn: BatchNorm2d::new(out_channels),
        }
    }

    pub fn forward(&mut self, x: &Array4<f64>) -> Array4<f64> {
        let out = relu(x);
        let out = conv1x1(&out, &self.weight, 1);
        self.bn.forward(&out)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.bn.set_training(training);
    }

    pub fn num_params(&self) -> usize {
        self.weight.len() + self.bn.num_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, Array4};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_conv2d_identity_kernel() {
        // 1x1 kernel with weight 1.0 reproduces the input
        let x = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, h, w)| (h * 3 + w) as f64);
        let w = Array4::ones((1, 1, 1, 1));
        let out = conv2d(&x, &w, 1, 0);
        assert_eq!(out, x);
    }

    #[test]
    fn test_conv2d_same_padding_shape() {
        let x = Array4::ones((2, 3, 8, 8));
        let w = Array4::ones((5, 3, 3, 3));
        let out = conv2d(&x, &w, 1, 1);
        assert_eq!(out.dim(), (2, 5, 8, 8));
        // interior positions see the full 3x3x3 window of ones
        assert!((out[[0, 0, 4, 4]] - 27.0).abs() < 1e-12);
    }

    #[test]
    fn test_conv2d_stride_two_halves_spatial() {
        let x = Array4::ones((1, 2, 8, 8));
        let w = Array4::ones((4, 2, 3, 3));
        let out = conv2d(&x, &w, 2, 1);
        assert_eq!(out.dim(), (1, 4, 4, 4));
    }

    #[test]
    fn test_depthwise_keeps_channels_separate() {
        let mut x = Array4::zeros((1, 2, 4, 4));
        x.index_axis_mut(ndarray::Axis(1), 0).fill(1.0);
        x.index_axis_mut(ndarray::Axis(1), 1).fill(2.0);
        let w = Array3::ones((2, 1, 1));
        let out = depthwise_conv2d(&x, &w, 1, 0);
        assert_eq!(out[[0, 0, 2, 2]], 1.0);
        assert_eq!(out[[0, 1, 2, 2]], 2.0);
    }

    #[test]
    fn test_conv1x1_strided() {
        let x = Array4::ones((1, 3, 8, 8));
        let w = Array2::ones((6, 3));
        let out = conv1x1(&x, &w, 2);
        assert_eq!(out.dim(), (1, 6, 4, 4));
        assert!((out[[0, 0, 0, 0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_relu_conv_bn_shape() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut op = ReluConvBn::new(4, 8, &mut rng);
        let x = Array4::from_shape_fn((2, 4, 6, 6), |_| rng.gen::<f64>());
        let out = op.forward(&x);
        assert_eq!(out.dim(), (2, 8, 6, 6));
    }
}
