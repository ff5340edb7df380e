//! The macro-network: stem, cell stack, heads

use ndarray::{Array2, Array4};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arch::Architecture;
use crate::error::{Result, SupernetError};
use crate::ops::{dropout, global_avg_pool, relu, BatchNorm2d, Conv2d, Linear, Shape};

use super::aux_head::AuxHead;
use super::cell::Cell;

/// Stem widening factor relative to the base channel count
const STEM_MULTIPLIER: usize = 3;

/// Construction parameters for a supernet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Cells per stage; the network has `3 * layers + 2` cells total
    pub layers: usize,
    /// Nodes per cell DAG
    pub nodes: usize,
    /// Base channel count, doubled at each reduction point
    pub channels: usize,
    /// Final dropout keep rate, in (0, 1]
    pub keep_prob: f64,
    /// Stochastic depth keep rate, in (0, 1]; `None` disables path drop
    pub drop_path_keep_prob: Option<f64>,
    /// Attach the auxiliary classifier at the second reduction point
    pub use_aux_head: bool,
    /// Total training steps, normalizes the stochastic depth schedule
    pub steps: usize,
    /// Classifier output width
    pub num_classes: usize,
    /// Side length of the square input images
    pub input_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            layers: 3,
            nodes: 5,
            channels: 20,
            keep_prob: 0.9,
            drop_path_keep_prob: Some(0.6),
            use_aux_head: false,
            steps: 10_000,
            num_classes: 10,
            input_size: 32,
        }
    }
}

impl NetworkConfig {
    /// Check parameter ranges before construction
    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &str, value: String, reason: &str) -> SupernetError {
            SupernetError::InvalidParameter {
                name: name.to_string(),
                value,
                reason: reason.to_string(),
            }
        }
        if self.layers == 0 {
            return Err(invalid("layers", "0".into(), "must be >= 1"));
        }
        if self.nodes == 0 {
            return Err(invalid("nodes", "0".into(), "must be >= 1"));
        }
        if self.channels == 0 || self.channels % 2 != 0 {
            return Err(invalid(
                "channels",
                self.channels.to_string(),
                "must be a positive even number",
            ));
        }
        if self.steps == 0 {
            return Err(invalid("steps", "0".into(), "must be >= 1"));
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return Err(invalid(
                "keep_prob",
                self.keep_prob.to_string(),
                "must be in (0, 1]",
            ));
        }
        if let Some(kp) = self.drop_path_keep_prob {
            if !(kp > 0.0 && kp <= 1.0) {
                return Err(invalid(
                    "drop_path_keep_prob",
                    kp.to_string(),
                    "must be in (0, 1]",
                ));
            }
        }
        if self.num_classes == 0 {
            return Err(invalid("num_classes", "0".into(), "must be >= 1"));
        }
        if self.input_size == 0 || self.input_size % 4 != 0 {
            return Err(invalid(
                "input_size",
                self.input_size.to_string(),
                "must be a positive multiple of 4 (two reduction points)",
            ));
        }
        if self.use_aux_head && self.input_size / 4 < 5 {
            return Err(invalid(
                "input_size",
                self.input_size.to_string(),
                "must be >= 20 when the auxiliary head is enabled",
            ));
        }
        Ok(())
    }
}

/// Weight-shared supernet over a cell-based search space
///
/// A stem, a stack of normal/reduction cells, an optional auxiliary head,
/// and a classifier. Every candidate operation is instantiated once at
/// construction; a forward call only routes through them as directed by
/// the supplied architecture encoding, so all encodings train one shared
/// parameter set.
#[derive(Debug, Clone)]
pub struct NasNetwork {
    config: NetworkConfig,
    stem_conv: Conv2d,
    stem_bn: BatchNorm2d,
    pub(crate) cells: Vec<Cell>,
    aux_head: Option<AuxHead>,
    aux_head_index: Option<usize>,
    classifier: Linear,
    training: bool,
    rng: Xoshiro256PlusPlus,
}

impl NasNetwork {
    /// Build the supernet; `seed` fixes initialization and every later
    /// stochastic draw for reproducible runs
    pub fn new(config: NetworkConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let mut rng = match seed {
            Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let total_layers = config.layers * 3 + 2;
        let pool_layers = [config.layers, 2 * config.layers + 1];
        let stem_channels = STEM_MULTIPLIER * config.channels;
        let stem_conv = Conv2d::new(3, stem_channels, 3, 1, 1, &mut rng);
        let stem_bn = BatchNorm2d::new(stem_channels);

        let mut outs = [Shape::new(config.input_size, config.input_size, stem_channels); 2];
        let mut channels = config.channels;
        let mut cells = Vec::with_capacity(total_layers);
        let mut aux_head = None;
        let mut aux_head_index = None;
        for i in 0..total_layers {
            let reduction = pool_layers.contains(&i);
            if reduction {
                channels *= 2;
            }
            let cell = Cell::new(
                outs,
                config.nodes,
                channels,
                reduction,
                i,
                total_layers,
                config.steps,
                config.drop_path_keep_prob,
                &mut rng,
            );
            outs = [outs[1], cell.out_shape()];
            cells.push(cell);
            if config.use_aux_head && i == pool_layers[1] {
                aux_head_index = Some(i);
                aux_head = Some(AuxHead::new(outs[1], config.num_classes, &mut rng));
            }
        }
        let classifier = Linear::new(outs[1].channels, config.num_classes, &mut rng);
        debug!(total_layers, final_shape = ?outs[1], "supernet constructed");

        Ok(Self {
            config,
            stem_conv,
            stem_bn,
            cells,
            aux_head,
            aux_head_index,
            classifier,
            training: true,
            rng,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Set training mode (batch-norm batch stats, dropout, path drop,
    /// auxiliary logits active)
    pub fn train(&mut self) {
        self.set_training(true);
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.set_training(false);
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.stem_bn.set_training(training);
        for cell in &mut self.cells {
            cell.set_training(training);
        }
        if let Some(head) = &mut self.aux_head {
            head.set_training(training);
        }
    }

    /// Total trainable parameter count
    pub fn num_params(&self) -> usize {
        self.stem_conv.num_params()
            + self.stem_bn.num_params()
            + self.cells.iter().map(|c| c.num_params()).sum::<usize>()
            + self.aux_head.as_ref().map(|h| h.num_params()).unwrap_or(0)
            + self.classifier.num_params()
    }

    /// Detached copy: structurally identical, parameters equal, storage
    /// independent; the copy's RNG stream diverges from the source's
    pub fn snapshot(&self) -> Self {
        let mut copy = self.clone();
        copy.rng.long_jump();
        copy
    }

    /// Run the supernet as routed by `arch`
    ///
    /// `step` is the current training step and is required whenever path
    /// drop is enabled in training mode. Returns the classifier logits
    /// and, in training mode with the auxiliary head configured, the
    /// auxiliary logits.
    pub fn forward(
        &mut self,
        input: &Array4<f64>,
        arch: &Architecture,
        step: Option<usize>,
    ) -> (Array2<f64>, Option<Array2<f64>>) {
        let (_, c, h, w) = input.dim();
        assert_eq!(c, 3, "expected 3-channel image input, got {c}");
        assert_eq!(
            (h, w),
            (self.config.input_size, self.config.input_size),
            "input spatial size is fixed at construction"
        );
        if let Err(e) = arch.validate(self.config.nodes) {
            panic!("invalid architecture encoding: {e}");
        }

        let stem = self.stem_bn.forward(&self.stem_conv.forward(input));
        let mut s0 = stem.clone();
        let mut s1 = stem;
        let mut aux_logits = None;

        let NasNetwork {
            ref mut cells,
            ref mut rng,
            ref mut aux_head,
            training,
            aux_head_index,
            ..
        } = *self;
        for (i, cell) in cells.iter_mut().enumerate() {
            let cell_arch = if cell.is_reduction() {
                &arch.reduction
            } else {
                &arch.normal
            };
            let out = cell.forward(&s0, &s1, cell_arch, step, rng);
            s0 = std::mem::replace(&mut s1, out);
            if training && aux_head_index == Some(i) {
                let head = aux_head.as_mut().expect("aux head exists at its index");
                aux_logits = Some(head.forward(&s1));
            }
        }

        let out = relu(&s1);
        let mut pooled = global_avg_pool(&out);
        if training {
            pooled = dropout(pooled, self.config.keep_prob, rng);
        }
        let logits = self.classifier.forward(&pooled);
        (logits, aux_logits)
    }
}
