use std::fmt;

use ndarray::ArrayD;

use crate::autograd;
use crate::error::FerroGradError;
use crate::graph::{Graph, NodeId};

/// Handle to one node of a computation graph.
///
/// A `Tensor` is a cheap, cloneable reference (shared graph + node id); the
/// node's value, gradient and provenance live in the graph arena. Accessors
/// here are the complete surface onto the underlying array; none of them
/// record graph edges.
#[derive(Clone)]
pub struct Tensor {
    graph: Graph,
    id: NodeId,
}

impl Tensor {
    pub(crate) fn from_parts(graph: Graph, id: NodeId) -> Self {
        Tensor { graph, id }
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Returns a clone of the tensor's shape.
    pub fn shape(&self) -> Vec<usize> {
        self.graph.read_inner().node(self.id).value.shape().to_vec()
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.graph.read_inner().node(self.id).value.ndim()
    }

    /// Returns the number of elements in the tensor.
    pub fn numel(&self) -> usize {
        self.graph.read_inner().node(self.id).value.len()
    }

    /// Returns a copy of the forward-computed value.
    pub fn value(&self) -> ArrayD<f64> {
        self.graph.read_inner().node(self.id).value.clone()
    }

    /// Extracts the single element of a one-element tensor.
    pub fn item(&self) -> Result<f64, FerroGradError> {
        let inner = self.graph.read_inner();
        let value = &inner.node(self.id).value;
        if value.len() != 1 {
            return Err(FerroGradError::ShapeMismatch {
                expected: vec![1],
                actual: value.shape().to_vec(),
                operation: "item".to_string(),
            });
        }
        Ok(value.iter().copied().next().unwrap_or(0.0))
    }

    /// Returns a copy of the accumulated gradient (zeros until a backward
    /// pass has reached this node).
    pub fn grad(&self) -> ArrayD<f64> {
        self.graph.read_inner().node(self.id).grad.clone()
    }

    /// Checks if the tensor tracks gradients.
    pub fn requires_grad(&self) -> bool {
        self.graph.read_inner().node(self.id).requires_grad
    }

    /// Checks if the tensor was created directly from data (no recorded
    /// operation).
    pub fn is_leaf(&self) -> bool {
        self.graph.read_inner().node(self.id).op.is_none()
    }

    /// Sets the `requires_grad` status of this tensor in place.
    /// Only allowed on leaf tensors.
    pub fn requires_grad_(&self, requires_grad: bool) -> Result<(), FerroGradError> {
        let mut inner = self.graph.write_inner();
        let node = inner.node_mut(self.id);
        if node.op.is_some() {
            return Err(FerroGradError::RequiresGradOnNonLeaf);
        }
        node.requires_grad = requires_grad;
        Ok(())
    }

    /// Resets the accumulated gradient to zeros.
    pub fn zero_grad(&self) {
        let mut inner = self.graph.write_inner();
        let node = inner.node_mut(self.id);
        node.grad = ArrayD::zeros(node.value.raw_dim());
    }

    /// Creates a new leaf sharing this tensor's value but detached from the
    /// graph (no provenance, no gradient tracking).
    pub fn detach(&self) -> Tensor {
        let value = self.value();
        self.graph.leaf(value, false)
    }

    /// Computes gradients of this tensor w.r.t. every tensor that
    /// contributed to it.
    ///
    /// Seeds this tensor's gradient with ones of its own shape, then runs the
    /// per-operation rules in an order where each node fires only after all
    /// of its consumers have. Gradients add up across calls; use
    /// [`Tensor::zero_grad`] between passes when accumulation is not wanted.
    pub fn backward(&self) -> Result<(), FerroGradError> {
        autograd::backward::run(&self.graph, self.id)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.graph.read_inner();
        let node = inner.node(self.id);
        f.debug_struct("Tensor")
            .field("shape", &node.value.shape())
            .field("requires_grad", &node.requires_grad)
            .field("value", &node.value)
            .finish()
    }
}

/// Verifies that two tensors belong to the same graph before combining them.
pub(crate) fn ensure_same_graph(
    a: &Tensor,
    b: &Tensor,
    operation: &str,
) -> Result<(), FerroGradError> {
    if a.graph.ptr_eq(&b.graph) {
        Ok(())
    } else {
        Err(FerroGradError::GraphMismatch {
            operation: operation.to_string(),
        })
    }
}
