// Element-wise arithmetic: add, sub, mul, div, pow, neg.
//
// Each forward computes its result through the array backend (honoring its
// broadcasting rules) and records a tagged node; the matching backward rule
// multiplies the local derivative into the upstream gradient and accumulates
// into each operand, reduced to that operand's own shape.

use ndarray::ArrayD;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::array;
use crate::autograd::backward::{accumulate, GradMap};
use crate::error::FerroGradError;
use crate::graph::{GraphInner, NodeId, Op};
use crate::tensor::{ensure_same_graph, Tensor};

// --- Forward operations ---

/// Performs element-wise addition of two tensors with broadcasting.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor, FerroGradError> {
    ensure_same_graph(a, b, "add")?;
    let value = array::add(&a.value(), &b.value())?;
    let requires_grad = a.requires_grad() || b.requires_grad();
    Ok(a.graph().push_result(value, requires_grad, Op::Add(a.id(), b.id())))
}

/// Performs element-wise subtraction of two tensors with broadcasting.
pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor, FerroGradError> {
    ensure_same_graph(a, b, "sub")?;
    let value = array::sub(&a.value(), &b.value())?;
    let requires_grad = a.requires_grad() || b.requires_grad();
    Ok(a.graph().push_result(value, requires_grad, Op::Sub(a.id(), b.id())))
}

/// Performs element-wise multiplication of two tensors with broadcasting.
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor, FerroGradError> {
    ensure_same_graph(a, b, "mul")?;
    let value = array::mul(&a.value(), &b.value())?;
    let requires_grad = a.requires_grad() || b.requires_grad();
    Ok(a.graph().push_result(value, requires_grad, Op::Mul(a.id(), b.id())))
}

/// Performs element-wise true division of two tensors with broadcasting.
pub fn div(a: &Tensor, b: &Tensor) -> Result<Tensor, FerroGradError> {
    ensure_same_graph(a, b, "div")?;
    let value = array::div(&a.value(), &b.value())?;
    let requires_grad = a.requires_grad() || b.requires_grad();
    Ok(a.graph().push_result(value, requires_grad, Op::Div(a.id(), b.id())))
}

/// Raises `a` element-wise to the power of `b`, with broadcasting.
pub fn pow(a: &Tensor, b: &Tensor) -> Result<Tensor, FerroGradError> {
    ensure_same_graph(a, b, "pow")?;
    let value = array::pow(&a.value(), &b.value())?;
    let requires_grad = a.requires_grad() || b.requires_grad();
    Ok(a.graph().push_result(value, requires_grad, Op::Pow(a.id(), b.id())))
}

/// Element-wise negation.
pub fn neg(a: &Tensor) -> Result<Tensor, FerroGradError> {
    let value = a.value().mapv(|x| -x);
    Ok(a.graph().push_result(value, a.requires_grad(), Op::Neg(a.id())))
}

impl Tensor {
    /// Element-wise power; see [`pow`].
    pub fn pow(&self, exponent: &Tensor) -> Result<Tensor, FerroGradError> {
        pow(self, exponent)
    }
}

// --- Backward rules ---

pub(crate) fn add_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    lhs: NodeId,
    rhs: NodeId,
) -> Result<(), FerroGradError> {
    accumulate(inner, grads, lhs, upstream.clone())?;
    accumulate(inner, grads, rhs, upstream.clone())
}

pub(crate) fn sub_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    lhs: NodeId,
    rhs: NodeId,
) -> Result<(), FerroGradError> {
    accumulate(inner, grads, lhs, upstream.clone())?;
    accumulate(inner, grads, rhs, upstream.mapv(|x| -x))
}

pub(crate) fn mul_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    lhs: NodeId,
    rhs: NodeId,
) -> Result<(), FerroGradError> {
    let lhs_contrib = array::mul(upstream, &inner.node(rhs).value)?;
    let rhs_contrib = array::mul(upstream, &inner.node(lhs).value)?;
    accumulate(inner, grads, lhs, lhs_contrib)?;
    accumulate(inner, grads, rhs, rhs_contrib)
}

pub(crate) fn div_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    lhs: NodeId,
    rhs: NodeId,
) -> Result<(), FerroGradError> {
    let lhs_val = &inner.node(lhs).value;
    let rhs_val = &inner.node(rhs).value;
    // d/d(lhs) = 1 / rhs
    let lhs_contrib = array::div(upstream, rhs_val)?;
    // d/d(rhs) = -lhs / rhs^2
    let denom = array::mul(rhs_val, rhs_val)?;
    let ratio = array::div(lhs_val, &denom)?;
    let rhs_contrib = array::mul(upstream, &ratio)?.mapv(|x| -x);
    accumulate(inner, grads, lhs, lhs_contrib)?;
    accumulate(inner, grads, rhs, rhs_contrib)
}

pub(crate) fn pow_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    lhs: NodeId,
    rhs: NodeId,
    out: NodeId,
) -> Result<(), FerroGradError> {
    let base = &inner.node(lhs).value;
    let exponent = &inner.node(rhs).value;
    let out_val = &inner.node(out).value;
    // d/d(base) = exponent * base^(exponent - 1)
    let shifted = exponent.mapv(|x| x - 1.0);
    let local_base = array::mul(exponent, &array::pow(base, &shifted)?)?;
    let lhs_contrib = array::mul(upstream, &local_base)?;
    // d/d(exponent) = out * ln(base)
    let local_exp = array::mul(out_val, &base.mapv(f64::ln))?;
    let rhs_contrib = array::mul(upstream, &local_exp)?;
    accumulate(inner, grads, lhs, lhs_contrib)?;
    accumulate(inner, grads, rhs, rhs_contrib)
}

pub(crate) fn neg_backward(
    inner: &GraphInner,
    grads: &mut GradMap,
    upstream: &ArrayD<f64>,
    src: NodeId,
) -> Result<(), FerroGradError> {
    accumulate(inner, grads, src, upstream.mapv(|x| -x))
}

// --- Operator sugar ---
//
// The fallible functions above are the primary API; the operators panic with
// the underlying error message, which keeps driver code readable.

impl Add for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: Self) -> Tensor {
        add(self, rhs).unwrap_or_else(|e| panic!("tensor addition failed: {e}"))
    }
}

impl Sub for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: Self) -> Tensor {
        sub(self, rhs).unwrap_or_else(|e| panic!("tensor subtraction failed: {e}"))
    }
}

impl Mul for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: Self) -> Tensor {
        mul(self, rhs).unwrap_or_else(|e| panic!("tensor multiplication failed: {e}"))
    }
}

impl Div for &Tensor {
    type Output = Tensor;
    fn div(self, rhs: Self) -> Tensor {
        div(self, rhs).unwrap_or_else(|e| panic!("tensor division failed: {e}"))
    }
}

impl Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        neg(self).unwrap_or_else(|e| panic!("tensor negation failed: {e}"))
    }
}

// --- Tests ---
