//! Stochastic depth (path drop) and dropout

use ndarray::{Array2, Array4, Axis};
use rand::Rng;

/// Scheduled keep probability for a branch
///
/// Scales the configured keep probability linearly with depth
/// (`(layer_id + 1) / total_layers`) and training progress
/// (`(step + 1) / total_steps`, clamped to 1): deeper layers and later
/// steps keep fewer paths.
pub fn effective_keep_prob(
    keep_prob: f64,
    layer_id: usize,
    total_layers: usize,
    step: usize,
    total_steps: usize,
) -> f64 {
    let layer_ratio = (layer_id + 1) as f64 / total_layers as f64;
    let kp = 1.0 - layer_ratio * (1.0 - keep_prob);
    let step_ratio = ((step + 1) as f64 / total_steps as f64).min(1.0);
    1.0 - step_ratio * (1.0 - kp)
}

/// Drop a branch per sample with the scheduled keep probability
///
/// Surviving samples are rescaled by `1 / keep_prob` to preserve the
/// expected activation. A scheduled keep probability of 1 is an exact
/// no-op and draws no randomness.
pub fn apply_drop_path(
    mut x: Array4<f64>,
    keep_prob: f64,
    layer_id: usize,
    total_layers: usize,
    step: usize,
    total_steps: usize,
    rng: &mut impl Rng,
) -> Array4<f64> {
    let kp = effective_keep_prob(keep_prob, layer_id, total_layers, step, total_steps);
    if kp >= 1.0 {
        return x;
    }
    for mut sample in x.axis_iter_mut(Axis(0)) {
        if rng.gen_bool(kp) {
            sample.mapv_inplace(|v| v / kp);
        } else {
            sample.fill(0.0);
        }
    }
    x
}

/// Elementwise dropout with survivor rescaling; `keep_prob` of 1 is a no-op
pub fn dropout(mut x: Array2<f64>, keep_prob: f64, rng: &mut impl Rng) -> Array2<f64> {
    assert!(keep_prob > 0.0 && keep_prob <= 1.0, "keep_prob must be in (0, 1]");
    if keep_prob >= 1.0 {
        return x;
    }
    for v in x.iter_mut() {
        if rng.gen_bool(keep_prob) {
            *v /= keep_prob;
        } else {
            *v = 0.0;
        }
    }
    x
}
