//! One DAG vertex inside a cell

use ndarray::Array4;
use rand::Rng;

use crate::arch::OpKind;
use crate::ops::{
    apply_drop_path, AvgPool2d, FactorizedReduce, MaxPool2d, Shape, WsSepConv,
};

/// One branch's full candidate set: one instantiated operation per op kind
///
/// Candidates exist per (branch, op-kind), not per architecture, so every
/// encoding that picks a given op kind on this branch routes through the
/// same parameter storage. The two reduction modules only exist for
/// stride-2 nodes and are keyed by cell-input slot, because a fixed
/// spatial reduction is tied to one input's channel shape.
#[derive(Debug, Clone)]
pub(crate) struct BranchCandidates {
    pub(crate) sep3: WsSepConv,
    pub(crate) sep5: WsSepConv,
    pub(crate) avg: AvgPool2d,
    pub(crate) max: MaxPool2d,
    pub(crate) reduce: Option<[FactorizedReduce; 2]>,
}

impl BranchCandidates {
    fn new(
        prev: &[Shape],
        channels: usize,
        stride: usize,
        num_slots: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let reduce = if stride > 1 {
            Some([
                FactorizedReduce::new(prev[0].channels, channels, rng),
                FactorizedReduce::new(prev[1].channels, channels, rng),
            ])
        } else {
            None
        };
        Self {
            sep3: WsSepConv::new(num_slots, channels, 3, 1, rng),
            sep5: WsSepConv::new(num_slots, channels, 5, 2, rng),
            avg: AvgPool2d::new(3, 1),
            max: MaxPool2d::new(3, 1),
            reduce,
        }
    }

    fn apply(&mut self, input: &Array4<f64>, id: usize, op: OpKind, stride: usize) -> Array4<f64> {
        match op {
            OpKind::SepConv3 => self.sep3.apply(input, id, stride),
            OpKind::SepConv5 => self.sep5.apply(input, id, stride),
            OpKind::AvgPool => self.avg.apply(input, stride),
            OpKind::MaxPool => self.max.apply(input, stride),
            OpKind::Identity => {
                if stride == 1 {
                    input.clone()
                } else {
                    let reduce = self
                        .reduce
                        .as_mut()
                        .expect("reduction candidates exist for stride-2 nodes");
                    match id {
                        0 => reduce[0].forward(input),
                        1 => reduce[1].forward(input),
                        other => panic!(
                            "identity at stride 2 requires a cell input, got predecessor {other}"
                        ),
                    }
                }
            }
        }
    }

    fn set_training(&mut self, training: bool) {
        self.sep3.set_training(training);
        self.sep5.set_training(training);
        if let Some(reduce) = &mut self.reduce {
            for r in reduce.iter_mut() {
                r.set_training(training);
            }
        }
    }

    fn num_params(&self) -> usize {
        self.sep3.num_params()
            + self.sep5.num_params()
            + self
                .reduce
                .as_ref()
                .map(|r| r.iter().map(|m| m.num_params()).sum())
                .unwrap_or(0)
    }
}

/// Combine two selected predecessor states through two selected operations
///
/// The effective stride of a branch is the node's stride only when the
/// branch consumes a true cell input (id 0 or 1); intermediate states are
/// already at the target resolution. Non-identity branches get stochastic
/// path drop in training when configured.
#[derive(Debug, Clone)]
pub struct Node {
    stride: usize,
    node_id: usize,
    layer_id: usize,
    total_layers: usize,
    total_steps: usize,
    drop_path_keep_prob: Option<f64>,
    training: bool,
    pub(crate) x: BranchCandidates,
    pub(crate) y: BranchCandidates,
    out_shape: Shape,
}

#[allow(clippy::too_many_arguments)]
impl Node {
    pub fn new(
        prev: &[Shape],
        channels: usize,
        stride: usize,
        drop_path_keep_prob: Option<f64>,
        node_id: usize,
        layer_id: usize,
        total_layers: usize,
        total_steps: usize,
        rng: &mut impl Rng,
    ) -> Self {
        assert!(stride == 1 || stride == 2, "stride must be 1 or 2, got {stride}");
        assert!(prev.len() >= 2, "a node needs at least the two cell inputs");
        let num_slots = node_id + 2;
        assert!(prev.len() >= num_slots, "node {node_id} is missing predecessor shapes");
        let x = BranchCandidates::new(prev, channels, stride, num_slots, rng);
        let y = BranchCandidates::new(prev, channels, stride, num_slots, rng);
        let out_shape = prev[0].reduced(stride, channels);
        Self {
            stride,
            node_id,
            layer_id,
            total_layers,
            total_steps,
            drop_path_keep_prob,
            training: true,
            x,
            y,
            out_shape,
        }
    }

    /// Output shape, fixed at construction
    pub fn out_shape(&self) -> Shape {
        self.out_shape
    }

    /// Route both branches and sum
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &mut self,
        x: &Array4<f64>,
        x_id: usize,
        x_op: OpKind,
        y: &Array4<f64>,
        y_id: usize,
        y_op: OpKind,
        step: Option<usize>,
        rng: &mut impl Rng,
    ) -> Array4<f64> {
        let limit = self.node_id + 2;
        assert!(x_id < limit && y_id < limit, "predecessor ids must be < {limit}");

        let x_stride = if x_id <= 1 { self.stride } else { 1 };
        let mut x_out = self.x.apply(x, x_id, x_op, x_stride);

        let y_stride = if y_id <= 1 { self.stride } else { 1 };
        let mut y_out = self.y.apply(y, y_id, y_op, y_stride);

        if self.training {
            if let Some(kp) = self.drop_path_keep_prob {
                let step = step.expect("step counter required while drop path is enabled");
                if x_op != OpKind::Identity {
                    x_out = apply_drop_path(
                        x_out,
                        kp,
                        self.layer_id,
                        self.total_layers,
                        step,
                        self.total_steps,
                        rng,
                    );
                }
                if y_op != OpKind::Identity {
                    y_out = apply_drop_path(
                        y_out,
                        kp,
                        self.layer_id,
                        self.total_layers,
                        step,
                        self.total_steps,
                        rng,
                    );
                }
            }
        }

        x_out + &y_out
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.training = training;
        self.x.set_training(training);
        self.y.set_training(training);
    }

    pub fn num_params(&self) -> usize {
        self.x.num_params() + self.y.num_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    const C: usize = 4;

    fn shapes() -> Vec<Shape> {
        vec![Shape::new(8, 8, C), Shape::new(8, 8, C)]
    }

    fn inputs(rng: &mut impl Rng) -> (Array4<f64>, Array4<f64>) {
        (
            Array4::from_shape_fn((2, C, 8, 8), |_| rng.gen::<f64>()),
            Array4::from_shape_fn((2, C, 8, 8), |_| rng.gen::<f64>()),
        )
    }

    #[test]
    fn test_out_shape_for_every_op_and_id_combination() {
        for stride in [1usize, 2] {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
            let mut node = Node::new(&shapes(), C, stride, None, 0, 0, 1, 1, &mut rng);
            node.set_training(false);
            let (x, y) = inputs(&mut rng);
            let expected = (2, C, 8 / stride, 8 / stride);
            for x_code in 0..OpKind::COUNT {
                for y_code in 0..OpKind::COUNT {
                    for x_id in 0..2 {
                        for y_id in 0..2 {
                            let out = node.forward(
                                &x,
                                x_id,
                                OpKind::decode(x_code),
                                &y,
                                y_id,
                                OpKind::decode(y_code),
                                None,
                                &mut rng,
                            );
                            assert_eq!(out.dim(), expected, "stride {stride} op {x_code}/{y_code}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_intermediate_predecessor_uses_stride_one() {
        // node 1 of a reduction cell: predecessor 2 is already reduced
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let prev = vec![
            Shape::new(8, 8, C),
            Shape::new(8, 8, C),
            Shape::new(4, 4, C),
        ];
        let mut node = Node::new(&prev, C, 2, None, 1, 0, 1, 1, &mut rng);
        node.set_training(false);
        let x = Array4::from_shape_fn((2, C, 8, 8), |_| rng.gen::<f64>());
        let state2 = Array4::from_shape_fn((2, C, 4, 4), |_| rng.gen::<f64>());
        // x branch reduces a cell input, y branch passes state 2 through
        let out = node.forward(&x, 0, OpKind::SepConv3, &state2, 2, OpKind::Identity, None, &mut rng);
        assert_eq!(out.dim(), (2, C, 4, 4));
    }

    #[test]
    #[should_panic(expected = "predecessor ids must be")]
    fn test_out_of_range_predecessor_fails_fast() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut node = Node::new(&shapes(), C, 1, None, 0, 0, 1, 1, &mut rng);
        let (x, y) = inputs(&mut rng);
        node.forward(&x, 2, OpKind::Identity, &y, 0, OpKind::Identity, None, &mut rng);
    }

    #[test]
    #[should_panic(expected = "step counter required")]
    fn test_missing_step_fails_fast_with_drop_path() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut node = Node::new(&shapes(), C, 1, Some(0.9), 0, 0, 1, 100, &mut rng);
        let (x, y) = inputs(&mut rng);
        node.forward(&x, 0, OpKind::SepConv3, &y, 1, OpKind::AvgPool, None, &mut rng);
    }

    #[test]
    fn test_identity_branches_bypass_drop_path() {
        // with both ops identity, no stochastic draw happens even though
        // drop path is configured, so repeated calls agree bit for bit
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut node = Node::new(&shapes(), C, 1, Some(0.5), 0, 0, 1, 100, &mut rng);
        let (x, y) = inputs(&mut rng);
        let a = node.forward(&x, 0, OpKind::Identity, &y, 1, OpKind::Identity, Some(0), &mut rng);
        let b = node.forward(&x, 0, OpKind::Identity, &y, 1, OpKind::Identity, Some(0), &mut rng);
        assert_eq!(a, b);
    }

    #[test]
    fn test_y_branch_reduction_uses_its_own_modules() {
        // both branches select identity at stride 2 from different inputs;
        // the y branch must be reduced from y's tensor, not x's
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut node = Node::new(&shapes(), C, 2, None, 0, 0, 1, 1, &mut rng);
        node.set_training(false);
        let (x, y) = inputs(&mut rng);
        let both = node.forward(&x, 0, OpKind::Identity, &y, 1, OpKind::Identity, None, &mut rng);
        let x_only = node.x.reduce.as_mut().unwrap()[0].forward(&x);
        let y_only = node.y.reduce.as_mut().unwrap()[1].forward(&y);
        let expected = x_only + &y_only;
        assert_eq!(both, expected);
    }

    #[test]
    fn test_same_op_kind_routes_through_identical_storage() {
        // two encodings that select sep-conv-3 on the x branch share the
        // exact candidate: its weight buffer address never changes between
        // calls, and perturbing it perturbs both encodings' outputs
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut node = Node::new(&shapes(), C, 1, None, 0, 0, 1, 1, &mut rng);
        node.set_training(false);
        let (x, y) = inputs(&mut rng);

        let ptr_before = node.x.sep3.dw1[0].as_ptr();
        let arch_a = node.forward(&x, 0, OpKind::SepConv3, &y, 1, OpKind::AvgPool, None, &mut rng);
        let arch_b = node.forward(&x, 0, OpKind::SepConv3, &y, 1, OpKind::MaxPool, None, &mut rng);
        assert_eq!(ptr_before, node.x.sep3.dw1[0].as_ptr());

        node.x.sep3.dw1[0] *= 2.0;
        node.x.sep3.pw1[0] *= 2.0;
        let arch_a2 = node.forward(&x, 0, OpKind::SepConv3, &y, 1, OpKind::AvgPool, None, &mut rng);
        let arch_b2 = node.forward(&x, 0, OpKind::SepConv3, &y, 1, OpKind::MaxPool, None, &mut rng);
        assert_ne!(arch_a, arch_a2);
        assert_ne!(arch_b, arch_b2);
    }
}
