// Cross-module scenarios: gradient chains, shared-node accumulation,
// repeated passes, and shape invariants.

use approx::assert_abs_diff_eq;
use ferrograd_core::Graph;

fn assert_values(actual: &ndarray::ArrayD<f64>, expected: &[f64]) {
    let flat: Vec<f64> = actual.iter().copied().collect();
    assert_eq!(flat.len(), expected.len(), "length mismatch");
    for (a, e) in flat.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-9);
    }
}

#[test]
fn chain_of_add_mul_div_produces_expected_gradients() {
    let g = Graph::new();
    let a = g.tensor(vec![1.0, 2.0, 3.0], &[3]).unwrap();
    let b = g.tensor(vec![4.0, 5.0, 6.0], &[3]).unwrap();
    let d = g.tensor(vec![7.0, 8.0, 9.0], &[3]).unwrap();
    let f = g.tensor(vec![10.0, 11.0, 12.0], &[3]).unwrap();

    let c = &a + &b;
    let e = &c * &d;
    let l = &e / &f;

    assert_values(&c.value(), &[5.0, 7.0, 9.0]);
    assert_values(&e.value(), &[35.0, 63.0, 81.0]);
    assert_values(&l.value(), &[3.5, 63.0 / 11.0, 6.75]);

    l.backward().unwrap();

    // dL/df = -e / f^2
    assert_values(&f.grad(), &[-0.35, -63.0 / 121.0, -0.5625]);
    // dL/dd = c / f
    assert_values(&d.grad(), &[0.5, 7.0 / 11.0, 0.75]);
    // dL/dc = d / f, and addition passes it through unchanged.
    assert_values(&c.grad(), &[0.7, 8.0 / 11.0, 0.75]);
    assert_eq!(a.grad(), c.grad());
    assert_eq!(a.grad(), b.grad());
    // The terminal's own gradient is the seed.
    assert_values(&l.grad(), &[1.0, 1.0, 1.0]);
}

#[test]
fn diamond_graph_accumulates_both_contributions() {
    // One leaf feeding two different operations that both feed a shared
    // terminal: its final gradient is the sum of both contributions.
    let g = Graph::new();
    let x = g.tensor(vec![2.0, 3.0], &[2]).unwrap();
    let b = g.tensor(vec![10.0, 20.0], &[2]).unwrap();
    let d = g.tensor(vec![4.0, 5.0], &[2]).unwrap();

    let left = &x + &b;
    let right = &x * &d;
    let out = (&left + &right).sum(None, false).unwrap();
    out.backward().unwrap();

    // d(out)/dx = 1 + d
    assert_values(&x.grad(), &[5.0, 6.0]);
}

#[test]
fn shared_intermediate_is_fully_accumulated_before_its_rule_runs() {
    // c = a + b is consumed by two products; a's gradient is only correct if
    // c's rule ran after both consumers contributed.
    let g = Graph::new();
    let a = g.tensor(vec![1.0, 2.0], &[2]).unwrap();
    let b = g.tensor(vec![3.0, 4.0], &[2]).unwrap();
    let d = g.tensor(vec![10.0, 100.0], &[2]).unwrap();
    let e = g.tensor(vec![7.0, 9.0], &[2]).unwrap();

    let c = &a + &b;
    let z1 = &c * &d;
    let z2 = &c * &e;
    let l = (&z1 + &z2).sum(None, false).unwrap();
    l.backward().unwrap();

    // dl/dc = d + e, flowing unchanged through the addition into a and b.
    assert_values(&a.grad(), &[17.0, 109.0]);
    assert_values(&c.grad(), &[17.0, 109.0]);
}

#[test]
fn backward_twice_accumulates_the_sum_of_two_passes() {
    let g = Graph::new();
    let a = g.tensor(vec![1.0, 2.0, 3.0], &[3]).unwrap();
    let b = g.tensor(vec![4.0, 5.0, 6.0], &[3]).unwrap();
    let d = g.tensor(vec![7.0, 8.0, 9.0], &[3]).unwrap();
    let f = g.tensor(vec![10.0, 11.0, 12.0], &[3]).unwrap();

    let c = &a + &b;
    let e = &c * &d;
    let l = &e / &f;

    l.backward().unwrap();
    let first_pass = a.grad();
    l.backward().unwrap();
    assert_eq!(a.grad(), &first_pass + &first_pass);

    // Re-zeroing restores single-pass gradients.
    a.zero_grad();
    l.backward().unwrap();
    assert_eq!(a.grad(), first_pass);
}

#[test]
fn dot_of_2x3_and_3x2_matches_matrix_calculus() {
    let g = Graph::new();
    let a = g
        .tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])
        .unwrap();
    let b = g
        .tensor(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2])
        .unwrap();

    let c = a.dot(&b).unwrap();
    assert_eq!(c.shape(), vec![2, 2]);
    assert_values(&c.value(), &[58.0, 64.0, 139.0, 154.0]);

    let loss = c.sum(None, false).unwrap();
    loss.backward().unwrap();

    // With upstream all-ones: dA = 1 @ Bᵀ, dB = Aᵀ @ 1.
    assert_eq!(a.grad().shape(), &[2, 3]);
    assert_values(&a.grad(), &[15.0, 19.0, 23.0, 15.0, 19.0, 23.0]);
    assert_eq!(b.grad().shape(), &[3, 2]);
    assert_values(&b.grad(), &[5.0, 5.0, 7.0, 7.0, 9.0, 9.0]);
}

#[test]
fn grad_shape_always_matches_value_shape() {
    let g = Graph::new();
    let a = g
        .tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])
        .unwrap();
    let b = g.tensor(vec![1.0, 2.0, 3.0], &[1, 3]).unwrap();
    let c = &a * &b;
    let m = c.mean(Some(0), false).unwrap();
    let l = m.sum(None, false).unwrap();

    let all = [&a, &b, &c, &m, &l];
    for t in all {
        assert_eq!(t.grad().shape(), t.value().shape());
    }
    l.backward().unwrap();
    for t in all {
        assert_eq!(t.grad().shape(), t.value().shape());
    }
}

#[test]
fn broadcast_chain_reduces_gradients_to_operand_shapes() {
    // (4, 3) plus a (3,) bias, reduced to a scalar loss: the bias gradient
    // must come back at (3,) with the batch summed away.
    let g = Graph::new();
    let x = g
        .tensor((0..12).map(f64::from).map(|v| v / 10.0).collect(), &[4, 3])
        .unwrap();
    let bias = g.tensor(vec![0.5, -0.5, 1.0], &[3]).unwrap();
    let shifted = &x + &bias;
    let loss = shifted.sum(None, false).unwrap();
    loss.backward().unwrap();

    assert_eq!(bias.grad().shape(), &[3]);
    assert_values(&bias.grad(), &[4.0, 4.0, 4.0]);
    assert_values(&loss.grad(), &[1.0]);
}
