use crate::error::FerroGradError;
use crate::graph::Graph;
use crate::nn::init;
use crate::nn::module::Module;
use crate::tensor::Tensor;

const DEFAULT_WEIGHT_SCALE: f64 = 1e-3;

/// Applies an affine transformation to the incoming data: y = x @ W + b.
///
/// The weight has shape `[in_features, out_features]` and the bias
/// `[out_features]`; the bias broadcasts over the batch dimension.
#[derive(Debug)]
pub struct Linear {
    weight: Tensor,
    bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Creates a new layer with normal-initialized weights (std 1e-3) and a
    /// zero bias, registered as gradient-tracking leaves of `graph`.
    pub fn new(graph: &Graph, in_features: usize, out_features: usize) -> Self {
        Self::with_weight_scale(graph, in_features, out_features, DEFAULT_WEIGHT_SCALE)
    }

    /// Same as [`Linear::new`] with an explicit weight standard deviation.
    pub fn with_weight_scale(
        graph: &Graph,
        in_features: usize,
        out_features: usize,
        weight_scale: f64,
    ) -> Self {
        let weight = init::normal(graph, &[in_features, out_features], weight_scale);
        let bias = graph.zeros(&[out_features]);
        Linear {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Result<Tensor, FerroGradError> {
        let product = input.dot(&self.weight)?;
        crate::ops::arithmetic::add(&product, &self.bias)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}
