use rand::Rng;
use rand_distr::StandardNormal;

use crate::graph::Graph;
use crate::tensor::Tensor;

/// Creates a leaf tensor with samples from a zero-mean normal distribution
/// of the given standard deviation.
pub fn normal(graph: &Graph, shape: &[usize], std: f64) -> Tensor {
    let mut rng = rand::thread_rng();
    let numel: usize = shape.iter().product();
    let data: Vec<f64> = (0..numel)
        .map(|_| {
            let sample: f64 = rng.sample(StandardNormal);
            sample * std
        })
        .collect();
    graph
        .tensor(data, shape)
        .unwrap_or_else(|e| unreachable!("sampled buffer matches shape: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_shape_and_scale() {
        let g = Graph::new();
        let t = normal(&g, &[50, 20], 1e-3);
        assert_eq!(t.shape(), vec![50, 20]);
        assert!(t.requires_grad());
        // Samples at std 1e-3 stay tiny.
        assert!(t.value().iter().all(|x| x.abs() < 1.0));
    }
}
