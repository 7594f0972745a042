// Adapter over the `ndarray` backend. Every direct call into the array
// library lives here; the rest of the crate works in terms of these helpers.

use std::cmp::max;

use ndarray::{Array, ArrayD, Axis, IxDyn};

use crate::error::FerroGradError;

/// Builds a dense array from a flat row-major buffer and a shape.
pub(crate) fn from_vec(data: Vec<f64>, shape: &[usize]) -> Result<ArrayD<f64>, FerroGradError> {
    let numel: usize = shape.iter().product();
    if data.len() != numel {
        return Err(FerroGradError::TensorCreationError {
            data_len: data.len(),
            shape: shape.to_vec(),
        });
    }
    Array::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| FerroGradError::InternalError(format!("array construction failed: {e}")))
}

/// Determines the output shape resulting from broadcasting two input shapes.
///
/// Follows NumPy/PyTorch broadcasting rules:
/// 1. If the shapes have different numbers of dimensions, prepend 1s to the shorter shape.
/// 2. Compare dimensions element-wise from right to left.
/// 3. Dimensions are compatible if they are equal, or one of them is 1.
/// 4. The resulting dimension is the larger of the two compared dimensions.
pub(crate) fn broadcast_shapes(
    shape_a: &[usize],
    shape_b: &[usize],
) -> Result<Vec<usize>, FerroGradError> {
    let rank_a = shape_a.len();
    let rank_b = shape_b.len();
    let max_rank = max(rank_a, rank_b);
    let mut result_shape = vec![0; max_rank];

    for i in 0..max_rank {
        let dim_a = shape_a.get(rank_a.wrapping_sub(1 + i)).copied().unwrap_or(1);
        let dim_b = shape_b.get(rank_b.wrapping_sub(1 + i)).copied().unwrap_or(1);

        result_shape[max_rank - 1 - i] = if dim_a == dim_b {
            dim_a
        } else if dim_a == 1 {
            dim_b
        } else if dim_b == 1 {
            dim_a
        } else {
            return Err(FerroGradError::BroadcastError {
                shape1: shape_a.to_vec(),
                shape2: shape_b.to_vec(),
            });
        };
    }
    Ok(result_shape)
}

/// Element-wise combination of two arrays under full NumPy-style broadcasting.
///
/// `ndarray` itself only broadcasts the right-hand operand against the left,
/// so both operands are first broadcast to their joint shape.
pub(crate) fn zip_broadcast<F>(
    a: &ArrayD<f64>,
    b: &ArrayD<f64>,
    f: F,
) -> Result<ArrayD<f64>, FerroGradError>
where
    F: Fn(f64, f64) -> f64,
{
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    let mut out = a
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| FerroGradError::BroadcastError {
            shape1: a.shape().to_vec(),
            shape2: shape.clone(),
        })?
        .to_owned();
    let rhs = b
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| FerroGradError::BroadcastError {
            shape1: b.shape().to_vec(),
            shape2: shape.clone(),
        })?;
    out.zip_mut_with(&rhs, |x, &y| *x = f(*x, y));
    Ok(out)
}

pub(crate) fn add(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, FerroGradError> {
    zip_broadcast(a, b, |x, y| x + y)
}

pub(crate) fn sub(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, FerroGradError> {
    zip_broadcast(a, b, |x, y| x - y)
}

pub(crate) fn mul(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, FerroGradError> {
    zip_broadcast(a, b, |x, y| x * y)
}

pub(crate) fn div(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, FerroGradError> {
    zip_broadcast(a, b, |x, y| x / y)
}

pub(crate) fn pow(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, FerroGradError> {
    zip_broadcast(a, b, f64::powf)
}

/// Matrix product C = A @ B for 2-D operands: [M, K] @ [K, N] -> [M, N].
pub(crate) fn matmul(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, FerroGradError> {
    let incompatible = || FerroGradError::IncompatibleShapes {
        shape1: a.shape().to_vec(),
        shape2: b.shape().to_vec(),
    };
    let a2 = a
        .view()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|_| incompatible())?;
    let b2 = b
        .view()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|_| incompatible())?;
    if a2.ncols() != b2.nrows() {
        return Err(incompatible());
    }
    Ok(a2.dot(&b2).into_dyn())
}

/// Transpose (all axes reversed, matching the backend's `.t()` view).
pub(crate) fn transposed(a: &ArrayD<f64>) -> ArrayD<f64> {
    a.t().to_owned()
}

/// Reduces a gradient contribution down to the shape of the operand it
/// belongs to.
///
/// When broadcasting occurs during a forward pass (e.g. A[2,3] + B[3] ->
/// C[2,3]), the gradient flowing back to an input must have the shape of that
/// input: prepended broadcast dimensions are summed away, and dimensions that
/// were 1 in the operand are summed back down to 1.
pub(crate) fn reduce_to_shape(
    grad: ArrayD<f64>,
    target: &[usize],
) -> Result<ArrayD<f64>, FerroGradError> {
    let mut reduced = grad;
    while reduced.ndim() > target.len() {
        reduced = reduced.sum_axis(Axis(0));
    }
    for (i, &dim) in target.iter().enumerate() {
        if dim == 1 && reduced.shape()[i] != 1 {
            reduced = reduced.sum_axis(Axis(i)).insert_axis(Axis(i));
        }
    }
    if reduced.shape() != target {
        return Err(FerroGradError::GradientAccumulationShapeMismatch {
            expected: target.to_vec(),
            actual: reduced.shape().to_vec(),
        });
    }
    Ok(reduced)
}

/// Expands a reduction's upstream gradient back out to the pre-reduction
/// shape: the squeezed axis (if any) is reinserted, then the result is
/// broadcast to `target`.
pub(crate) fn expand_from_reduction(
    upstream: &ArrayD<f64>,
    target: &[usize],
    axis: Option<usize>,
    keepdims: bool,
) -> Result<ArrayD<f64>, FerroGradError> {
    let restored = match (axis, keepdims) {
        (Some(ax), false) => upstream.clone().insert_axis(Axis(ax)),
        _ => upstream.clone(),
    };
    let restored_shape = restored.shape().to_vec();
    restored
        .broadcast(IxDyn(target))
        .map(|v| v.to_owned())
        .ok_or(FerroGradError::BroadcastError {
            shape1: restored_shape,
            shape2: target.to_vec(),
        })
}

fn check_axis(axis: usize, rank: usize) -> Result<(), FerroGradError> {
    if axis >= rank {
        Err(FerroGradError::InvalidAxis { axis, rank })
    } else {
        Ok(())
    }
}

fn full_reduction_shape(rank: usize, keepdims: bool) -> Vec<usize> {
    if keepdims {
        vec![1; rank]
    } else {
        vec![]
    }
}

/// Sum over all elements (`axis = None`) or along one axis, with optional
/// kept dimensions.
pub(crate) fn reduce_sum(
    value: &ArrayD<f64>,
    axis: Option<usize>,
    keepdims: bool,
) -> Result<ArrayD<f64>, FerroGradError> {
    match axis {
        None => {
            let shape = full_reduction_shape(value.ndim(), keepdims);
            Ok(ArrayD::from_elem(IxDyn(&shape), value.sum()))
        }
        Some(ax) => {
            check_axis(ax, value.ndim())?;
            let partial = value.sum_axis(Axis(ax));
            Ok(if keepdims {
                partial.insert_axis(Axis(ax))
            } else {
                partial
            })
        }
    }
}

/// Mean over all elements (`axis = None`) or along one axis.
pub(crate) fn reduce_mean(
    value: &ArrayD<f64>,
    axis: Option<usize>,
    keepdims: bool,
) -> Result<ArrayD<f64>, FerroGradError> {
    match axis {
        None => {
            let m = value.mean().ok_or(FerroGradError::DivisionByZero)?;
            let shape = full_reduction_shape(value.ndim(), keepdims);
            Ok(ArrayD::from_elem(IxDyn(&shape), m))
        }
        Some(ax) => {
            check_axis(ax, value.ndim())?;
            let partial = value
                .mean_axis(Axis(ax))
                .ok_or(FerroGradError::DivisionByZero)?;
            Ok(if keepdims {
                partial.insert_axis(Axis(ax))
            } else {
                partial
            })
        }
    }
}

/// Max over all elements (`axis = None`) or along one axis.
pub(crate) fn reduce_max(
    value: &ArrayD<f64>,
    axis: Option<usize>,
    keepdims: bool,
) -> Result<ArrayD<f64>, FerroGradError> {
    if value.is_empty() {
        return Err(FerroGradError::UnsupportedOperation(
            "max of an empty tensor".to_string(),
        ));
    }
    match axis {
        None => {
            let m = value.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let shape = full_reduction_shape(value.ndim(), keepdims);
            Ok(ArrayD::from_elem(IxDyn(&shape), m))
        }
        Some(ax) => {
            check_axis(ax, value.ndim())?;
            let partial = value.fold_axis(Axis(ax), f64::NEG_INFINITY, |&acc, &x| acc.max(x));
            Ok(if keepdims {
                partial.insert_axis(Axis(ax))
            } else {
                partial
            })
        }
    }
}

/// Joint L2 norm over a set of arrays.
pub(crate) fn l2_norm(arrays: &[ArrayD<f64>]) -> f64 {
    arrays
        .iter()
        .map(|a| a.iter().map(|x| x * x).sum::<f64>())
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_shapes_equal() {
        assert_eq!(broadcast_shapes(&[2, 3], &[2, 3]), Ok(vec![2, 3]));
        assert_eq!(broadcast_shapes(&[5], &[5]), Ok(vec![5]));
        assert_eq!(broadcast_shapes(&[], &[]), Ok(vec![]));
    }

    #[test]
    fn test_broadcast_shapes_scalar() {
        assert_eq!(broadcast_shapes(&[2, 3], &[]), Ok(vec![2, 3]));
        assert_eq!(broadcast_shapes(&[], &[2, 3]), Ok(vec![2, 3]));
    }

    #[test]
    fn test_broadcast_shapes_one_dimension() {
        assert_eq!(broadcast_shapes(&[4, 1], &[4, 5]), Ok(vec![4, 5]));
        assert_eq!(broadcast_shapes(&[4, 5], &[1, 5]), Ok(vec![4, 5]));
        assert_eq!(broadcast_shapes(&[4, 1], &[1, 5]), Ok(vec![4, 5]));
    }

    #[test]
    fn test_broadcast_shapes_prepend_ones() {
        assert_eq!(broadcast_shapes(&[4, 5], &[5]), Ok(vec![4, 5]));
        assert_eq!(broadcast_shapes(&[2, 3, 4], &[3, 1]), Ok(vec![2, 3, 4]));
    }

    #[test]
    fn test_broadcast_shapes_mismatch() {
        assert!(broadcast_shapes(&[2, 3], &[2, 4]).is_err());
    }

    #[test]
    fn test_zip_broadcast_symmetric() {
        let a = from_vec(vec![1.0, 2.0, 3.0], &[3, 1]).unwrap();
        let b = from_vec(vec![10.0, 20.0], &[1, 2]).unwrap();
        let out = add(&a, &b).unwrap();
        assert_eq!(out.shape(), &[3, 2]);
        assert_eq!(
            out.iter().copied().collect::<Vec<_>>(),
            vec![11.0, 21.0, 12.0, 22.0, 13.0, 23.0]
        );
    }

    #[test]
    fn test_reduce_to_shape_prepended_axis() {
        let grad = from_vec(vec![1.0; 6], &[2, 3]).unwrap();
        let reduced = reduce_to_shape(grad, &[3]).unwrap();
        assert_eq!(reduced.shape(), &[3]);
        assert_eq!(reduced.iter().copied().collect::<Vec<_>>(), vec![2.0; 3]);
    }

    #[test]
    fn test_reduce_to_shape_kept_axis() {
        let grad = from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let reduced = reduce_to_shape(grad, &[2, 1]).unwrap();
        assert_eq!(reduced.shape(), &[2, 1]);
        assert_eq!(reduced.iter().copied().collect::<Vec<_>>(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_reduce_to_shape_scalar_target() {
        let grad = from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let reduced = reduce_to_shape(grad, &[]).unwrap();
        assert_eq!(reduced.shape(), &[] as &[usize]);
        assert_eq!(reduced.iter().copied().collect::<Vec<_>>(), vec![10.0]);
    }

    #[test]
    fn test_reduce_to_shape_irreducible() {
        let grad = from_vec(vec![1.0; 6], &[2, 3]).unwrap();
        let err = reduce_to_shape(grad, &[4]).unwrap_err();
        assert!(matches!(
            err,
            FerroGradError::GradientAccumulationShapeMismatch { .. }
        ));
    }

    #[test]
    fn test_matmul_shapes() {
        let a = from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let b = from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).unwrap();
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(
            c.iter().copied().collect::<Vec<_>>(),
            vec![22.0, 28.0, 49.0, 64.0]
        );

        let bad = from_vec(vec![0.0; 4], &[2, 2]).unwrap();
        assert!(matches!(
            matmul(&a, &bad),
            Err(FerroGradError::IncompatibleShapes { .. })
        ));
    }

    #[test]
    fn test_expand_from_reduction_reinserts_axis() {
        let upstream = from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let expanded = expand_from_reduction(&upstream, &[2, 3], Some(1), false).unwrap();
        assert_eq!(expanded.shape(), &[2, 3]);
        assert_eq!(
            expanded.iter().copied().collect::<Vec<_>>(),
            vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
        );
    }
}
