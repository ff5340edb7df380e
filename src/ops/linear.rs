//! Fully connected layer

use ndarray::{Array1, Array2};
use rand::Rng;

use super::init_scale;

/// Linear layer, weight layout `[out_features, in_features]`
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, rng: &mut impl Rng) -> Self {
        let scale = init_scale(in_features, out_features);
        let weight = Array2::from_shape_fn((out_features, in_features), |_| {
            (rng.gen::<f64>() - 0.5) * scale
        });
        Self {
            weight,
            bias: Array1::zeros(out_features),
        }
    }

    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weight.t()) + &self.bias
    }

    pub fn num_params(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
