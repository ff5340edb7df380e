//! A repeatable DAG of nodes with weight-shared routing

use ndarray::{Array4, Axis};
use rand::Rng;
use tracing::debug;

use crate::arch::CellArch;
use crate::ops::{CalibrateSize, Shape, WsCombineConv};

use super::node::Node;

/// One cell: calibrated inputs, a fixed set of nodes, and a projection of
/// the unconsumed states back to the working channel width
///
/// States live in an append-only arena scoped to one forward call, with a
/// parallel usage-count array. The concatenation set is exactly the states
/// nobody consumed: the loose ends of the DAG, which can include a cell
/// input no node ever read.
#[derive(Debug, Clone)]
pub struct Cell {
    reduction: bool,
    layer_id: usize,
    calibrate: CalibrateSize,
    pub(crate) nodes: Vec<Node>,
    combine: WsCombineConv,
    out_shape: Shape,
}

#[allow(clippy::too_many_arguments)]
impl Cell {
    pub fn new(
        prev: [Shape; 2],
        nodes: usize,
        channels: usize,
        reduction: bool,
        layer_id: usize,
        total_layers: usize,
        total_steps: usize,
        drop_path_keep_prob: Option<f64>,
        rng: &mut impl Rng,
    ) -> Self {
        let calibrate = CalibrateSize::new(prev, channels, rng);
        let mut shapes: Vec<Shape> = calibrate.out_shapes().to_vec();

        let stride = if reduction { 2 } else { 1 };
        let mut node_list = Vec::with_capacity(nodes);
        for i in 0..nodes {
            let node = Node::new(
                &shapes,
                channels,
                stride,
                drop_path_keep_prob,
                i,
                layer_id,
                total_layers,
                total_steps,
                rng,
            );
            shapes.push(node.out_shape());
            node_list.push(node);
        }

        let out_hw = shapes.iter().map(|s| s.height).min().unwrap_or(0);
        let combine = WsCombineConv::new(nodes + 2, channels, channels, rng);
        let out_shape = Shape::new(out_hw, out_hw, channels);
        debug!(layer_id, reduction, ?out_shape, "cell constructed");

        Self {
            reduction,
            layer_id,
            calibrate,
            nodes: node_list,
            combine,
            out_shape,
        }
    }

    /// Whether this is a reduction cell
    pub fn is_reduction(&self) -> bool {
        self.reduction
    }

    pub fn layer_id(&self) -> usize {
        self.layer_id
    }

    /// Output shape, fixed at construction
    pub fn out_shape(&self) -> Shape {
        self.out_shape
    }

    /// Evaluate the cell DAG as routed by `arch`
    pub fn forward(
        &mut self,
        s0: &Array4<f64>,
        s1: &Array4<f64>,
        arch: &CellArch,
        step: Option<usize>,
        rng: &mut impl Rng,
    ) -> Array4<f64> {
        assert_eq!(
            arch.num_nodes(),
            self.nodes.len(),
            "encoding node count must match the cell"
        );
        let (s0, s1) = self.calibrate.forward(s0, s1);

        let mut states: Vec<Array4<f64>> = vec![s0, s1];
        let mut used = vec![0usize; self.nodes.len() + 2];
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let gene = arch.gene(i);
            assert!(
                gene.x_id < i + 2 && gene.y_id < i + 2,
                "node {i} may only consume already-produced states"
            );
            used[gene.x_id] += 1;
            used[gene.y_id] += 1;
            let out = node.forward(
                &states[gene.x_id],
                gene.x_id,
                gene.x_op,
                &states[gene.y_id],
                gene.y_id,
                gene.y_op,
                step,
                rng,
            );
            states.push(out);
        }

        let concat: Vec<usize> = used
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(i, _)| i)
            .collect();
        assert!(!concat.is_empty(), "every state was consumed; nothing to concatenate");

        let views: Vec<_> = concat.iter().map(|&i| states[i].view()).collect();
        let cat = ndarray::concatenate(Axis(1), &views)
            .expect("concatenated states must share batch and spatial dims");
        self.combine.forward(&cat, &concat)
    }

    pub(crate) fn set_training(&mut self, training: bool) {
        self.calibrate.set_training(training);
        self.combine.set_training(training);
        for node in &mut self.nodes {
            node.set_training(training);
        }
    }

    pub fn num_params(&self) -> usize {
        self.calibrate.num_params()
            + self.combine.num_params()
            + self.nodes.iter().map(|n| n.num_params()).sum::<usize>()
    }
}
