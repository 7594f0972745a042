// Batch gradient descent over autograd-computed gradients.
//
// Each step builds a fresh graph over the current parameter values, runs the
// backward pass on the loss, and applies `param -= lr * grad`. Parameters are
// plain arrays between steps; graph nodes are never mutated in place.

use ndarray::ArrayD;

use crate::array;
use crate::error::FerroGradError;
use crate::graph::Graph;
use crate::tensor::Tensor;

/// Configuration for [`gradient_descent`].
#[derive(Debug, Clone)]
pub struct GradientDescent {
    pub learning_rate: f64,
    /// Stop once the joint L2 norm of all parameter gradients is at or below
    /// this value (or becomes NaN/infinite).
    pub threshold: f64,
    /// Hard cap on the number of steps.
    pub max_steps: usize,
}

impl Default for GradientDescent {
    fn default() -> Self {
        GradientDescent {
            learning_rate: 0.01,
            threshold: 1e-1,
            max_steps: 10_000,
        }
    }
}

/// Minimizes a loss built by `loss_fn` over `params`, returning the final
/// parameter values.
///
/// `loss_fn` receives a fresh graph and the current parameters as tracking
/// leaves on that graph and must return the loss tensor to differentiate.
pub fn gradient_descent<F>(
    mut params: Vec<ArrayD<f64>>,
    loss_fn: F,
    config: &GradientDescent,
) -> Result<Vec<ArrayD<f64>>, FerroGradError>
where
    F: Fn(&Graph, &[Tensor]) -> Result<Tensor, FerroGradError>,
{
    for step in 0..config.max_steps {
        let graph = Graph::new();
        let leaves: Vec<Tensor> = params
            .iter()
            .map(|p| graph.from_array(p.clone()))
            .collect();

        let loss = loss_fn(&graph, &leaves)?;
        loss.backward()?;

        let grads: Vec<ArrayD<f64>> = leaves.iter().map(|t| t.grad()).collect();
        let norm = array::l2_norm(&grads);
        log::trace!("gradient descent step {step}: grad l2 = {norm}");
        if norm.is_nan() || norm.is_infinite() || norm <= config.threshold {
            log::debug!("gradient descent converged after {step} steps (l2 = {norm})");
            return Ok(params);
        }

        for (param, grad) in params.iter_mut().zip(grads.iter()) {
            *param -= &grad.mapv(|x| x * config.learning_rate);
        }
    }
    log::debug!("gradient descent stopped at max_steps = {}", config.max_steps);
    Ok(params)
}
