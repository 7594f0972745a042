use crate::error::FerroGradError;
use crate::nn::module::Module;
use crate::tensor::Tensor;

/// Row-wise softmax over the last axis of a 2-D input.
///
/// The input is shifted by its detached row maximum before exponentiation;
/// softmax is invariant to that shift, so no gradient needs to flow through
/// it.
#[derive(Debug, Default)]
pub struct Softmax;

impl Softmax {
    pub fn new() -> Self {
        Softmax
    }
}

impl Module for Softmax {
    fn forward(&self, input: &Tensor) -> Result<Tensor, FerroGradError> {
        let row_max = input.max(Some(1), true)?;
        let shifted = crate::ops::arithmetic::sub(input, &row_max)?;
        let exponentiated = shifted.exp()?;
        let row_sum = exponentiated.sum(Some(1), true)?;
        crate::ops::arithmetic::div(&exponentiated, &row_sum)
    }

    fn parameters(&self) -> Vec<Tensor> {
        Vec::new()
    }
}
