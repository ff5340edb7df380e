//! Batch normalization over NCHW feature maps

use ndarray::{Array1, Array4, Axis};

/// Batch normalization with running statistics
///
/// Training mode normalizes with batch statistics and updates the running
/// mean/variance; eval mode normalizes with the running statistics only.
/// The running statistics are the sole cross-call mutable state beyond
/// trainable parameters.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    momentum: f64,
    eps: f64,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
    gamma: Array1<f64>,
    beta: Array1<f64>,
    training: bool,
}

impl BatchNorm2d {
    pub fn new(num_features: usize) -> Self {
        Self {
            momentum: 0.1,
            eps: 1e-5,
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            training: true,
        }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn num_params(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    /// Forward pass over `[batch, channels, height, width]`
    pub fn forward(&mut self, x: &Array4<f64>) -> Array4<f64> {
        let channels = x.dim().1;
        assert_eq!(channels, self.gamma.len(), "channel count fixed at construction");

        let (mean, var) = if self.training {
            let mut mean = Array1::zeros(channels);
            let mut var = Array1::zeros(channels);
            for c in 0..channels {
                let lane = x.index_axis(Axis(1), c);
                let m = lane.mean().unwrap_or(0.0);
                let v = lane.mapv(|val| (val - m) * (val - m)).mean().unwrap_or(0.0);
                mean[c] = m;
                var[c] = v;
            }
            self.running_mean = &self.running_mean * (1.0 - self.momentum) + &mean * self.momentum;
            self.running_var = &self.running_var * (1.0 - self.momentum) + &var * self.momentum;
            (mean, var)
        } else {
            (self.running_mean.clone(), self.running_var.clone())
        };

        let mut out = x.clone();
        for (c, mut lane) in out.axis_iter_mut(Axis(1)).enumerate() {
            let inv = 1.0 / (var[c] + self.eps).sqrt();
            let (m, g, b) = (mean[c], self.gamma[c], self.beta[c]);
            lane.mapv_inplace(|v| (v - m) * inv * g + b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_training_output_is_standardized() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut bn = BatchNorm2d::new(3);
        let x = ndarray::Array4::from_shape_fn((4, 3, 5, 5), |_| rng.gen::<f64>() * 10.0);
        let out = bn.forward(&x);
        for c in 0..3 {
            let lane = out.index_axis(Axis(1), c);
            let mean = lane.mean().unwrap();
            let var = lane.mapv(|v| (v - mean) * (v - mean)).mean().unwrap();
            assert!(mean.abs() < 1e-9, "channel mean should be ~0, got {mean}");
            assert!((var - 1.0).abs() < 1e-3, "channel var should be ~1, got {var}");
        }
    }

    #[test]
    fn test_eval_uses_running_stats() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut bn = BatchNorm2d::new(2);
        let x = ndarray::Array4::from_shape_fn((4, 2, 4, 4), |_| rng.gen::<f64>());
        bn.forward(&x);
        bn.eval();
        let a = bn.forward(&x);
        let b = bn.forward(&x);
        // eval mode neither draws randomness nor mutates stats
        assert_eq!(a, b);
    }
}
