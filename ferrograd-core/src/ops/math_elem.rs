// Element-wise natural log and exponential.

use ndarray::ArrayD;

use crate::array;
use crate::autograd::backward::{accumulate, GradMap};
use crate::error::FerroGradError;
use crate::graph::{GraphInner, NodeId, Op};
use crate::tensor::Tensor;

/// Element-wise natural logarithm.
pub fn log(a: &Tensor) -> Result<Tensor, FerroGradError> {
    let value = a.value().mapv(f64::ln);
    Ok(a.graph().push_result(value, a.requires_grad(), Op::Log(a.id())))
}

/// Element-wise exponential.
pub fn exp(a: &Tensor) -> Result<Tensor, FerroGradError> {
    let value = a.value().mapv(f64::exp);
    Ok(a.graph().push_result(value, a.requires_grad(), Op::Exp(a.id())))
}

impl Tensor {
    /// Element-wise natural logarithm; see [`log`].
    pub fn log(&self) -> Result<Tensor, FerroGradError> {
        log(self)
    }

    /// Element-wise exponential; see [`exp`].
    pub fn exp(&self) -> Result<Tensor, FerroGradError> {
        exp(self)
    }
}

pub(crate) fn log_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    src: NodeId,
) -> Result<(), FerroGradError> {
    // d/dx ln(x) = 1/x
    let contrib = array::div(upstream, &inner.node(src).value)?;
    accumulate(inner, grads, src, contrib)
}

pub(crate) fn exp_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    src: NodeId,
    out: NodeId,
) -> Result<(), FerroGradError> {
    // d/dx exp(x) = exp(x), already materialized as the output value.
    let contrib = array::mul(upstream, &inner.node(out).value)?;
    accumulate(inner, grads, src, contrib)
}
