// The backward engine: dependency-ordered traversal plus per-operation
// dispatch on the recorded tag.

use std::collections::{HashMap, HashSet};

use ndarray::ArrayD;

use crate::array;
use crate::error::FerroGradError;
use crate::graph::{Graph, GraphInner, NodeId, Op};
use crate::ops::{arithmetic, linalg, math_elem, reduction};

/// Per-pass gradient buffers, keyed by node id.
///
/// Rules accumulate into this map; the persistent `grad` fields are only
/// touched once every rule has run. A pass therefore either completes fully
/// or leaves the graph untouched, and running two passes accumulates exactly
/// the sum of two single passes.
pub(crate) type GradMap = HashMap<NodeId, ArrayD<f64>>;

pub(crate) fn run(graph: &Graph, root: NodeId) -> Result<(), FerroGradError> {
    let mut inner = graph.write_inner();

    if !inner.node(root).requires_grad {
        return Err(FerroGradError::RequiresGradNotMet);
    }
    if inner.node(root).op.is_none() {
        log::debug!("backward() called on a leaf tensor; seeding only");
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut order: Vec<NodeId> = Vec::new();
    topo_visit(&inner, root, &mut visited, &mut order);
    log::debug!("backward pass over {} nodes", order.len());

    let mut grads: GradMap = HashMap::new();
    grads.insert(root, ArrayD::ones(inner.node(root).value.raw_dim()));

    // Postorder puts operands before consumers, so the reverse walk runs each
    // node only after every consumer that feeds it has already fired.
    for &id in order.iter().rev() {
        let op = match inner.node(id).op.clone() {
            Some(op) => op,
            None => continue,
        };
        let upstream = match grads.get(&id).cloned() {
            Some(g) => g,
            // Reachable only through non-tracking branches; nothing to push.
            None => continue,
        };
        dispatch(&inner, &mut grads, id, &op, &upstream)?;
    }

    for (id, pass_grad) in grads {
        inner.node_mut(id).grad += &pass_grad;
    }
    Ok(())
}

fn topo_visit(
    inner: &GraphInner,
    id: NodeId,
    visited: &mut HashSet<NodeId>,
    order: &mut Vec<NodeId>,
) {
    if !visited.insert(id) {
        return;
    }
    if let Some(op) = &inner.node(id).op {
        for operand in op.operands() {
            topo_visit(inner, operand, visited, order);
        }
    }
    order.push(id);
}

fn dispatch(
    inner: &GraphInner,
    grads: &mut GradMap,
    out: NodeId,
    op: &Op,
    upstream: &ArrayD<f64>,
) -> Result<(), FerroGradError> {
    match *op {
        Op::Add(lhs, rhs) => arithmetic::add_backward(inner, grads, upstream, lhs, rhs),
        Op::Sub(lhs, rhs) => arithmetic::sub_backward(inner, grads, upstream, lhs, rhs),
        Op::Mul(lhs, rhs) => arithmetic::mul_backward(inner, grads, upstream, lhs, rhs),
        Op::Div(lhs, rhs) => arithmetic::div_backward(inner, grads, upstream, lhs, rhs),
        Op::Pow(lhs, rhs) => arithmetic::pow_backward(inner, grads, upstream, lhs, rhs, out),
        Op::Neg(src) => arithmetic::neg_backward(inner, grads, upstream, src),
        Op::Dot(lhs, rhs) => linalg::dot_backward(inner, grads, upstream, lhs, rhs),
        Op::Transpose(src) => linalg::transpose_backward(inner, grads, upstream, src),
        Op::Log(src) => math_elem::log_backward(inner, grads, upstream, src),
        Op::Exp(src) => math_elem::exp_backward(inner, grads, upstream, src, out),
        Op::Sum {
            src,
            axis,
            keepdims,
        } => reduction::sum_backward(inner, grads, upstream, src, axis, keepdims),
        Op::Mean {
            src,
            axis,
            keepdims,
        } => reduction::mean_backward(inner, grads, upstream, src, axis, keepdims),
    }
}

/// Adds a gradient contribution into an operand's per-pass buffer, reducing
/// broadcast dimensions down to the operand's own shape first.
pub(crate) fn accumulate(
    inner: &GraphInner,
    grads: &mut GradMap,
    target: NodeId,
    contrib: ArrayD<f64>,
) -> Result<(), FerroGradError> {
    let node = inner.node(target);
    if !node.requires_grad {
        return Ok(());
    }
    let reduced = array::reduce_to_shape(contrib, node.value.shape())?;
    match grads.entry(target) {
        std::collections::hash_map::Entry::Occupied(mut e) => {
            *e.get_mut() += &reduced;
        }
        std::collections::hash_map::Entry::Vacant(e) => {
            e.insert(reduced);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::FerroGradError;
    use crate::graph::Graph;

    #[test]
    fn test_backward_requires_grad() {
        let g = Graph::new();
        let a = g.tensor(vec![1.0, 2.0], &[2]).unwrap();
        a.requires_grad_(false).unwrap();
        assert_eq!(a.backward().unwrap_err(), FerroGradError::RequiresGradNotMet);
    }

    #[test]
    fn test_backward_on_leaf_seeds_ones() {
        let g = Graph::new();
        let a = g.tensor(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        a.backward().unwrap();
        assert_eq!(a.grad().iter().copied().collect::<Vec<_>>(), vec![1.0; 3]);
    }

    #[test]
    fn test_each_rule_runs_once_for_shared_nodes() {
        // Diamond: a feeds two different ops that join in the terminal. The
        // shared node must receive both contributions before its own rule
        // fires, and fire exactly once.
        let g = Graph::new();
        let a = g.tensor(vec![2.0, 3.0], &[2]).unwrap();
        let b = g.tensor(vec![5.0, 7.0], &[2]).unwrap();
        let d = g.tensor(vec![11.0, 13.0], &[2]).unwrap();

        let left = &a + &b;
        let right = &a * &d;
        let out = &left + &right;
        out.backward().unwrap();

        // d(out)/d(a) = 1 + d
        assert_eq!(
            a.grad().iter().copied().collect::<Vec<_>>(),
            vec![12.0, 14.0]
        );
        assert_eq!(b.grad().iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0]);
        assert_eq!(d.grad().iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_no_grad_leaf_receives_nothing() {
        let g = Graph::new();
        let a = g.tensor(vec![1.0, 2.0], &[2]).unwrap();
        let b = g.tensor(vec![3.0, 4.0], &[2]).unwrap();
        b.requires_grad_(false).unwrap();
        let out = &a * &b;
        out.backward().unwrap();
        assert_eq!(a.grad().iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0]);
        assert_eq!(b.grad().iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0]);
    }
}
