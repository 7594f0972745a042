// Arena storage for the computation graph.
//
// Nodes live in a flat vector owned by a shared `Graph` handle; operand edges
// are stable indices into that vector. `Tensor` values are lightweight
// handles (graph reference + node id), so a node can be an operand of many
// downstream nodes without any ownership cycles.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::array;
use crate::error::FerroGradError;
use crate::tensor::Tensor;

/// Stable identifier of a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// The operation that produced a node, tagged by kind.
///
/// Leaves carry no `Op` at all. The backward engine dispatches on the tag, so
/// an unrecognized operation cannot be represented, let alone encountered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    Div(NodeId, NodeId),
    Pow(NodeId, NodeId),
    Neg(NodeId),
    Dot(NodeId, NodeId),
    Log(NodeId),
    Exp(NodeId),
    Transpose(NodeId),
    Sum {
        src: NodeId,
        axis: Option<usize>,
        keepdims: bool,
    },
    Mean {
        src: NodeId,
        axis: Option<usize>,
        keepdims: bool,
    },
}

impl Op {
    /// Operand ids in forward order.
    pub(crate) fn operands(&self) -> Vec<NodeId> {
        match *self {
            Op::Add(a, b)
            | Op::Sub(a, b)
            | Op::Mul(a, b)
            | Op::Div(a, b)
            | Op::Pow(a, b)
            | Op::Dot(a, b) => vec![a, b],
            Op::Neg(a) | Op::Log(a) | Op::Exp(a) | Op::Transpose(a) => vec![a],
            Op::Sum { src, .. } | Op::Mean { src, .. } => vec![src],
        }
    }
}

/// One value/gradient/provenance record.
///
/// `value` is never mutated after creation; `grad` starts as zeros of the
/// same shape and only ever accumulates (or is reset by `zero_grad`).
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) value: ArrayD<f64>,
    pub(crate) grad: ArrayD<f64>,
    pub(crate) requires_grad: bool,
    pub(crate) op: Option<Op>,
}

#[derive(Debug, Default)]
pub(crate) struct GraphInner {
    pub(crate) nodes: Vec<Node>,
}

impl GraphInner {
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn push(&mut self, value: ArrayD<f64>, requires_grad: bool, op: Option<Op>) -> NodeId {
        let grad = ArrayD::zeros(value.raw_dim());
        self.nodes.push(Node {
            value,
            grad,
            requires_grad,
            op,
        });
        NodeId(self.nodes.len() - 1)
    }
}

/// Shared handle to a computation graph.
///
/// Cloning the handle shares the underlying arena; all tensors combined by an
/// operation must come from the same graph. The `RwLock` follows the usual
/// shared-ownership/interior-mutability split: forward operations take a
/// short write lock to append a node, the backward pass holds the write lock
/// for the whole traversal.
#[derive(Debug, Clone)]
pub struct Graph {
    inner: Arc<RwLock<GraphInner>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            inner: Arc::new(RwLock::new(GraphInner::default())),
        }
    }

    /// Creates a leaf tensor from a flat row-major buffer and a shape.
    ///
    /// Leaves track gradients by default; use [`Tensor::requires_grad_`] to
    /// opt out.
    pub fn tensor(&self, data: Vec<f64>, shape: &[usize]) -> Result<Tensor, FerroGradError> {
        let value = array::from_vec(data, shape)?;
        Ok(self.leaf(value, true))
    }

    /// Creates a leaf tensor from an existing dense array.
    pub fn from_array(&self, value: ArrayD<f64>) -> Tensor {
        self.leaf(value, true)
    }

    /// Creates a leaf tensor filled with zeros.
    pub fn zeros(&self, shape: &[usize]) -> Tensor {
        self.leaf(ArrayD::zeros(IxDyn(shape)), true)
    }

    /// Creates a leaf tensor filled with ones.
    pub fn ones(&self, shape: &[usize]) -> Tensor {
        self.leaf(ArrayD::ones(IxDyn(shape)), true)
    }

    /// Creates a leaf tensor filled with a specific value.
    pub fn full(&self, shape: &[usize], value: f64) -> Tensor {
        self.leaf(ArrayD::from_elem(IxDyn(shape), value), true)
    }

    /// Creates a leaf tensor with standard-normal samples.
    pub fn randn(&self, shape: &[usize]) -> Tensor {
        let mut rng = rand::thread_rng();
        let numel: usize = shape.iter().product();
        let data: Vec<f64> = (0..numel).map(|_| rng.sample(StandardNormal)).collect();
        let value = array::from_vec(data, shape)
            .unwrap_or_else(|e| unreachable!("randn buffer matches shape: {e}"));
        self.leaf(value, true)
    }

    pub(crate) fn leaf(&self, value: ArrayD<f64>, requires_grad: bool) -> Tensor {
        let id = self.write_inner().push(value, requires_grad, None);
        Tensor::from_parts(self.clone(), id)
    }

    /// Appends the result node of an operation.
    pub(crate) fn push_result(&self, value: ArrayD<f64>, requires_grad: bool, op: Op) -> Tensor {
        let id = self.write_inner().push(value, requires_grad, Some(op));
        Tensor::from_parts(self.clone(), id)
    }

    /// Number of nodes currently recorded.
    pub fn len(&self) -> usize {
        self.read_inner().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_inner().nodes.is_empty()
    }

    pub(crate) fn read_inner(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().expect("graph lock poisoned")
    }

    pub(crate) fn write_inner(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().expect("graph lock poisoned")
    }

    pub(crate) fn ptr_eq(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
