use ndarray::ArrayD;
use thiserror::Error;

use crate::error::FerroGradError;
use crate::graph::Graph;
use crate::tensor::Tensor;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for input tensor at index {input_index}, element index {element_index}: Analytical grad {analytical_grad:?} != Numerical grad {numerical_grad:?}. Difference: {difference:?}")]
    GradientMismatch {
        input_index: usize,
        element_index: usize,
        analytical_grad: f64,
        numerical_grad: f64,
        difference: f64,
    },

    #[error("Forward function execution failed during gradient check: {0}")]
    ForwardPassError(FerroGradError),

    #[error("Backward pass execution failed during gradient check: {0}")]
    BackwardPassError(FerroGradError),

    #[error("Numerical gradient is NaN or infinite for input {input_index}, element {element_index}. Loss+: {loss_plus:?}, Loss-: {loss_minus:?}")]
    NumericalGradNaNOrInfinite {
        input_index: usize,
        element_index: usize,
        loss_plus: f64,
        loss_minus: f64,
    },

    #[error("Analytical gradient is NaN or infinite for input {input_index}, element {element_index}. Value: {value:?}")]
    AnalyticalGradNaNOrInfinite {
        input_index: usize,
        element_index: usize,
        value: f64,
    },

    #[error("Tensor error during intermediate calculation: {0}")]
    TensorError(FerroGradError),
}

impl From<FerroGradError> for GradCheckError {
    fn from(err: FerroGradError) -> Self {
        GradCheckError::TensorError(err)
    }
}

/// Checks analytical gradients against numerical gradients using central
/// finite differences.
///
/// `func` builds the computation under test from freshly created leaves; the
/// scalar loss used on both sides is the plain sum of the output's elements,
/// so the analytical side runs backward from `func(..).sum()`.
pub fn check_grad<F>(
    func: F,
    inputs: &[ArrayD<f64>],
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError>
where
    F: Fn(&Graph, &[Tensor]) -> Result<Tensor, FerroGradError>,
{
    // --- Analytical pass ---
    let graph = Graph::new();
    let leaves: Vec<Tensor> = inputs.iter().map(|arr| graph.from_array(arr.clone())).collect();
    let output = func(&graph, &leaves).map_err(GradCheckError::ForwardPassError)?;
    let loss = output.sum(None, false).map_err(GradCheckError::ForwardPassError)?;
    loss.backward().map_err(GradCheckError::BackwardPassError)?;
    let analytical_grads: Vec<ArrayD<f64>> = leaves.iter().map(|t| t.grad()).collect();

    // --- Numerical loss evaluation on perturbed inputs ---
    let eval_loss = |perturbed: &[ArrayD<f64>]| -> Result<f64, GradCheckError> {
        let g = Graph::new();
        let ls: Vec<Tensor> = perturbed.iter().map(|arr| g.from_array(arr.clone())).collect();
        let out = func(&g, &ls).map_err(GradCheckError::ForwardPassError)?;
        Ok(out.value().sum())
    };

    for (i, original) in inputs.iter().enumerate() {
        let analytical = &analytical_grads[i];
        let flat: Vec<f64> = original.iter().copied().collect();
        let analytical_flat: Vec<f64> = analytical.iter().copied().collect();

        for elem_idx in 0..flat.len() {
            let mut data_plus = flat.clone();
            data_plus[elem_idx] += epsilon;
            let mut inputs_plus = inputs.to_vec();
            inputs_plus[i] = crate::array::from_vec(data_plus, original.shape())?;
            let loss_plus = eval_loss(&inputs_plus)?;

            let mut data_minus = flat.clone();
            data_minus[elem_idx] -= epsilon;
            let mut inputs_minus = inputs.to_vec();
            inputs_minus[i] = crate::array::from_vec(data_minus, original.shape())?;
            let loss_minus = eval_loss(&inputs_minus)?;

            let numerical_grad = (loss_plus - loss_minus) / (2.0 * epsilon);
            let analytical_grad = analytical_flat[elem_idx];

            if numerical_grad.is_nan() || numerical_grad.is_infinite() {
                return Err(GradCheckError::NumericalGradNaNOrInfinite {
                    input_index: i,
                    element_index: elem_idx,
                    loss_plus,
                    loss_minus,
                });
            }
            if analytical_grad.is_nan() || analytical_grad.is_infinite() {
                return Err(GradCheckError::AnalyticalGradNaNOrInfinite {
                    input_index: i,
                    element_index: elem_idx,
                    value: analytical_grad,
                });
            }

            let difference = (analytical_grad - numerical_grad).abs();
            if difference > tolerance
                && (difference / (analytical_grad.abs() + epsilon)) > tolerance
            {
                return Err(GradCheckError::GradientMismatch {
                    input_index: i,
                    element_index: elem_idx,
                    analytical_grad,
                    numerical_grad,
                    difference,
                });
            }
        }
    }

    Ok(())
}
