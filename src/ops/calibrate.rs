//! Cell-input size calibration

use ndarray::Array4;
use rand::Rng;

use super::conv::ReluConvBn;
use super::reduce::FactorizedReduce;
use super::Shape;

#[derive(Debug, Clone)]
enum Calibration {
    Pass,
    Reduce(FactorizedReduce),
    Project(ReluConvBn),
}

/// Bring a cell's two predecessor outputs to a common spatial size and the
/// working channel width
///
/// After a reduction cell the two predecessors differ by exactly a factor
/// of two in resolution; the larger one is factorized-reduced. Channel
/// mismatches are fixed with a 1x1 projection. Output shapes are computed
/// once here and drive all downstream shape math.
#[derive(Debug, Clone)]
pub struct CalibrateSize {
    fix0: Calibration,
    fix1: Calibration,
    out_shapes: [Shape; 2],
}

impl CalibrateSize {
    pub fn new(prev: [Shape; 2], channels: usize, rng: &mut impl Rng) -> Self {
        let [p0, p1] = prev;
        let (fix0, out0) = if p0.height != p1.height {
            assert_eq!(
                p0.height,
                2 * p1.height,
                "calibration expects a single factor-2 resolution gap"
            );
            (
                Calibration::Reduce(FactorizedReduce::new(p0.channels, channels, rng)),
                Shape::new(p1.height, p1.width, channels),
            )
        } else if p0.channels != channels {
            (
                Calibration::Project(ReluConvBn::new(p0.channels, channels, rng)),
                Shape::new(p0.height, p0.width, channels),
            )
        } else {
            (Calibration::Pass, p0)
        };
        let (fix1, out1) = if p1.channels != channels {
            (
                Calibration::Project(ReluConvBn::new(p1.channels, channels, rng)),
                Shape::new(p1.height, p1.width, channels),
            )
        } else {
            (Calibration::Pass, p1)
        };
        Self {
            fix0,
            fix1,
            out_shapes: [out0, out1],
        }
    }

    /// Calibrated shapes of the two inputs
    pub fn out_shapes(&self) -> [Shape; 2] {
        self.out_shapes
    }

    pub fn forward(&mut self, s0: &Array4<f64>, s1: &Array4<f64>) -> (Array4<f64>, Array4<f64>) {
        let s0 = match &mut self.fix0 {
            Calibration::Pass => s0.clone(),
            Calibration::Reduce(r) => r.forward(s0),
            Calibration::Project(p) => p.forward(s0),
        };
        let s1 = match &mut self.fix1 {
            Calibration::Pass => s1.clone(),
            Calibration::Reduce(r) => r.forward(s1),
            Calibration::Project(p) => p.forward(s1),
        };
        (s0, s1)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        for fix in [&mut self.fix0, &mut self.fix1] {
            match fix {
                Calibration::Pass => {}
                Calibration::Reduce(r) => r.set_training(training),
                Calibration::Project(p) => p.set_training(training),
            }
        }
    }

    pub fn num_params(&self) -> usize {
        [&self.fix0, &self.fix1]
            .iter()
            .map(|fix| match fix {
                Calibration::Pass => 0,
                Calibration::Reduce(r) => r.num_params(),
                Calibration::Project(p) => p.num_params(),
            })
            .sum()
    }
}
