use crate::error::FerroGradError;
use crate::tensor::Tensor;

/// The base trait for all neural network modules (layers, containers, etc.).
///
/// A module composes tensors through the engine's operators in `forward` and
/// exposes its learnable parameters as leaf tensors that track gradients.
pub trait Module: std::fmt::Debug {
    /// Performs a forward pass of the module.
    fn forward(&self, input: &Tensor) -> Result<Tensor, FerroGradError>;

    /// Returns all learnable parameters of the module.
    ///
    /// Parameters are leaf tensors with gradient tracking enabled.
    fn parameters(&self) -> Vec<Tensor>;

    /// Runs the backward engine on an output produced by this module.
    fn backward(&self, output: &Tensor) -> Result<(), FerroGradError> {
        output.backward()
    }

    /// Resets the gradients of all parameters to zeros.
    fn zero_grad(&self) {
        for param in self.parameters() {
            param.zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[derive(Debug)]
    struct Scale {
        factor: Tensor,
    }

    impl Module for Scale {
        fn forward(&self, input: &Tensor) -> Result<Tensor, FerroGradError> {
            crate::ops::arithmetic::mul(input, &self.factor)
        }

        fn parameters(&self) -> Vec<Tensor> {
            vec![self.factor.clone()]
        }
    }

    #[test]
    fn test_module_backward_hook_and_zero_grad() {
        let g = Graph::new();
        let module = Scale {
            factor: g.tensor(vec![3.0], &[1]).unwrap(),
        };
        let input = g.tensor(vec![2.0, 4.0], &[2]).unwrap();
        input.requires_grad_(false).unwrap();

        let out = module.forward(&input).unwrap();
        let loss = out.sum(None, false).unwrap();
        module.backward(&loss).unwrap();
        assert_eq!(
            module.parameters()[0].grad().iter().copied().collect::<Vec<_>>(),
            vec![6.0]
        );

        module.zero_grad();
        assert_eq!(
            module.parameters()[0].grad().iter().copied().collect::<Vec<_>>(),
            vec![0.0]
        );
    }
}
