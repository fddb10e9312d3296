//! Differentiable losses

use super::node::record;
use crate::autograd::Tensor;
use ndarray::Array1;

/// Mean squared error; `targets` never receive a gradient
pub fn mse(predictions: &Tensor, targets: &Tensor) -> Tensor {
    let diff = &*predictions.data() - &*targets.data();
    let n = diff.len().max(1) as f32;
    let value = diff.mapv(|d| d * d).sum() / n;

    // d/dp = 2 (p - t) / n
    let slope = diff.mapv(|d| 2.0 * d / n);
    record(Array1::from(vec![value]), &[predictions], move |g| {
        vec![&slope * g[0]]
    })
}
