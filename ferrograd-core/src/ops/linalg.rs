// Matrix product and transpose.

use ndarray::ArrayD;

use crate::array;
use crate::autograd::backward::{accumulate, GradMap};
use crate::error::FerroGradError;
use crate::graph::{GraphInner, NodeId, Op};
use crate::tensor::{ensure_same_graph, Tensor};

/// Matrix product C = A @ B for 2-D tensors: [M, K] @ [K, N] -> [M, N].
///
/// Backward propagates `upstream @ Bᵀ` into A and `Aᵀ @ upstream` into B,
/// which lands each contribution exactly at its operand's own shape.
pub fn dot(a: &Tensor, b: &Tensor) -> Result<Tensor, FerroGradError> {
    ensure_same_graph(a, b, "dot")?;
    let value = array::matmul(&a.value(), &b.value())?;
    let requires_grad = a.requires_grad() || b.requires_grad();
    Ok(a.graph().push_result(value, requires_grad, Op::Dot(a.id(), b.id())))
}

/// Transpose (all axes reversed). Gradients flow back transposed the same
/// way.
pub fn transpose(a: &Tensor) -> Result<Tensor, FerroGradError> {
    let value = array::transposed(&a.value());
    Ok(a.graph()
        .push_result(value, a.requires_grad(), Op::Transpose(a.id())))
}

impl Tensor {
    /// Matrix product; see [`dot`].
    pub fn dot(&self, other: &Tensor) -> Result<Tensor, FerroGradError> {
        dot(self, other)
    }

    /// Transposed view of this tensor as a new graph node; see [`transpose`].
    pub fn transpose(&self) -> Result<Tensor, FerroGradError> {
        transpose(self)
    }

    /// Short alias for [`Tensor::transpose`].
    pub fn t(&self) -> Result<Tensor, FerroGradError> {
        transpose(self)
    }
}

pub(crate) fn dot_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    lhs: NodeId,
    rhs: NodeId,
) -> Result<(), FerroGradError> {
    let lhs_val = &inner.node(lhs).value;
    let rhs_val = &inner.node(rhs).value;
    let lhs_contrib = array::matmul(upstream, &array::transposed(rhs_val))?;
    let rhs_contrib = array::matmul(&array::transposed(lhs_val), upstream)?;
    accumulate(inner, grads, lhs, lhs_contrib)?;
    accumulate(inner, grads, rhs, rhs_contrib)
}

pub(crate) fn transpose_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    src: NodeId,
) -> Result<(), FerroGradError> {
    accumulate(inner, grads, src, array::transposed(upstream))
}
