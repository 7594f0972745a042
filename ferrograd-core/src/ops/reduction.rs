// Reductions: sum and mean (differentiable), max (detached).

use ndarray::ArrayD;

use crate::array;
use crate::autograd::backward::{accumulate, GradMap};
use crate::error::FerroGradError;
use crate::graph::{GraphInner, NodeId, Op};
use crate::tensor::Tensor;

/// Sums over all elements (`axis = None`) or along one axis.
///
/// With `keepdims` the reduced dimension is kept at size 1, which lets the
/// result broadcast back against the input (softmax-style usage).
pub fn sum(a: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor, FerroGradError> {
    let reduced = array::reduce_sum(&a.value(), axis, keepdims)?;
    Ok(a.graph().push_result(
        reduced,
        a.requires_grad(),
        Op::Sum {
            src: a.id(),
            axis,
            keepdims,
        },
    ))
}

/// Arithmetic mean over all elements (`axis = None`) or along one axis.
pub fn mean(a: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor, FerroGradError> {
    let reduced = array::reduce_mean(&a.value(), axis, keepdims)?;
    Ok(a.graph().push_result(
        reduced,
        a.requires_grad(),
        Op::Mean {
            src: a.id(),
            axis,
            keepdims,
        },
    ))
}

/// Maximum over all elements (`axis = None`) or along one axis.
///
/// The result is a fresh detached leaf: no provenance is recorded and no
/// gradient flows through it. Its intended use is gradient-free shifts such
/// as softmax stabilization.
pub fn max(a: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor, FerroGradError> {
    let reduced = array::reduce_max(&a.value(), axis, keepdims)?;
    Ok(a.graph().leaf(reduced, false))
}

impl Tensor {
    /// Sum reduction; see [`sum`].
    pub fn sum(&self, axis: Option<usize>, keepdims: bool) -> Result<Tensor, FerroGradError> {
        sum(self, axis, keepdims)
    }

    /// Mean reduction; see [`mean`].
    pub fn mean(&self, axis: Option<usize>, keepdims: bool) -> Result<Tensor, FerroGradError> {
        mean(self, axis, keepdims)
    }

    /// Detached max reduction; see [`max`].
    pub fn max(&self, axis: Option<usize>, keepdims: bool) -> Result<Tensor, FerroGradError> {
        max(self, axis, keepdims)
    }
}

pub(crate) fn sum_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    src: NodeId,
    axis: Option<usize>,
    keepdims: bool,
) -> Result<(), FerroGradError> {
    let src_shape = inner.node(src).value.shape().to_vec();
    let contrib = array::expand_from_reduction(upstream, &src_shape, axis, keepdims)?;
    accumulate(inner, grads, src, contrib)
}

pub(crate) fn mean_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    src: NodeId,
    axis: Option<usize>,
    keepdims: bool,
) -> Result<(), FerroGradError> {
    let src_value = &inner.node(src).value;
    let src_shape = src_value.shape().to_vec();
    let count = match axis {
        None => src_value.len(),
        Some(ax) => src_shape[ax],
    };
    if count == 0 {
        return Err(FerroGradError::DivisionByZero);
    }
    let expanded = array::expand_from_reduction(upstream, &src_shape, axis, keepdims)?;
    let contrib = expanded.mapv(|x| x / count as f64);
    accumulate(inner, grads, src, contrib)
}
