//! Gradient clipping utilities
//!
//! Both clippers mutate gradients in place through shared tensor handles and
//! silently skip parameters that have no gradient.

use crate::Tensor;
use serde::{Deserialize, Serialize};

/// Clipping algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradClipAlgorithm {
    /// Rescale so the aggregate L2 norm stays under the threshold
    #[default]
    Norm,
    /// Clamp every element into `[-threshold, threshold]`
    Value,
}

/// Clip threshold plus algorithm
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipSpec {
    /// Threshold; absent or non-positive disables clipping
    #[serde(default)]
    pub value: Option<f32>,
    /// Algorithm used when clipping is active
    #[serde(default)]
    pub algorithm: GradClipAlgorithm,
}

impl ClipSpec {
    /// Clip by aggregate norm
    pub fn norm(max_norm: f32) -> Self {
        Self {
            value: Some(max_norm),
            algorithm: GradClipAlgorithm::Norm,
        }
    }

    /// Clip by element value
    pub fn value(clip_value: f32) -> Self {
        Self {
            value: Some(clip_value),
            algorithm: GradClipAlgorithm::Value,
        }
    }

    /// No clipping
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Threshold, if clipping is active
    pub fn threshold(&self) -> Option<f32> {
        self.value.filter(|v| *v > 0.0)
    }

    /// Whether this spec clips anything
    pub fn is_active(&self) -> bool {
        self.threshold().is_some()
    }

    /// Apply this spec to a set of parameters
    ///
    /// Returns the pre-clip aggregate norm for norm clipping, `None` otherwise.
    pub fn apply<'a, I>(&self, params: I) -> Option<f32>
    where
        I: IntoIterator<Item = &'a Tensor>,
    {
        let threshold = self.threshold()?;
        match self.algorithm {
            GradClipAlgorithm::Norm => Some(clip_grad_norm(params, threshold)),
            GradClipAlgorithm::Value => {
                clip_grad_value(params, threshold);
                None
            }
        }
    }
}

/// Clamp every gradient element into `[-clip_value, clip_value]`
///
/// A non-positive (or NaN) `clip_value` leaves every gradient untouched.
pub fn clip_grad_value<'a, I>(params: I, clip_value: f32)
where
    I: IntoIterator<Item = &'a Tensor>,
{
    if !(clip_value > 0.0) {
        return;
    }

    for param in params {
        param.update_grad(|grad| grad.mapv_inplace(|g| g.clamp(-clip_value, clip_value)));
    }
}

/// Aggregate L2 norm of every gradient, accumulated in f64
pub fn total_grad_norm<'a, I>(params: I) -> f32
where
    I: IntoIterator<Item = &'a Tensor>,
{
    let total_norm_sq: f64 = params
        .into_iter()
        .filter_map(Tensor::grad)
        .map(|grad| grad.iter().map(|&g| f64::from(g) * f64::from(g)).sum::<f64>())
        .sum();
    total_norm_sq.sqrt() as f32
}

/// Clip gradients by global norm
///
/// Computes the global norm of all gradients and scales them down if the norm
/// exceeds `max_norm`, preserving the relative magnitudes across parameters:
///
/// 1. `global_norm = sqrt(sum of all gradient squared norms)`
/// 2. if `global_norm > max_norm`, every gradient is multiplied by
///    `max_norm / (global_norm + 1e-6)`
///
/// Gradients are left bit-for-bit unchanged when the norm is already within
/// bounds or `max_norm` is non-positive.
///
/// # Returns
/// The global norm before clipping
pub fn clip_grad_norm<'a, I>(params: I, max_norm: f32) -> f32
where
    I: IntoIterator<Item = &'a Tensor>,
{
    let params: Vec<&Tensor> = params.into_iter().collect();
    let global_norm = total_grad_norm(params.iter().copied());

    if max_norm > 0.0 && global_norm > max_norm {
        let clip_coef = max_norm / (global_norm + 1e-6);
        for param in params {
            param.update_grad(|grad| grad.mapv_inplace(|g| g * clip_coef));
        }
    }

    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use proptest::prelude::*;

    fn with_grads(grads: &[&[f32]]) -> Vec<Tensor> {
        grads
            .iter()
            .map(|g| {
                let t = Tensor::zeros(g.len(), true);
                t.set_grad(arr1(g));
                t
            })
            .collect()
    }

    fn grad_bits(params: &[Tensor]) -> Vec<Vec<u32>> {
        params
            .iter()
            .map(|p| p.grad().map(|g| g.iter().map(|v| v.to_bits()).collect()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_clip_grad_norm_no_clipping() {
        let params = with_grads(&[&[0.1, 0.2], &[0.1]]);

        // sqrt(0.1^2 + 0.2^2 + 0.1^2) ≈ 0.245
        let global_norm = clip_grad_norm(&params, 1.0);

        assert_abs_diff_eq!(global_norm, 0.245, epsilon = 1e-3);
        assert_eq!(params[0].grad().unwrap().to_vec(), vec![0.1, 0.2]);
        assert_eq!(params[1].grad().unwrap().to_vec(), vec![0.1]);
    }

    #[test]
    fn test_clip_grad_norm_with_clipping() {
        let params = with_grads(&[&[3.0, 4.0], &[0.0]]);

        let global_norm = clip_grad_norm(&params, 1.0);

        assert_abs_diff_eq!(global_norm, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].grad().unwrap()[0], 0.6, epsilon = 1e-5);
        assert_abs_diff_eq!(params[0].grad().unwrap()[1], 0.8, epsilon = 1e-5);
        assert_abs_diff_eq!(params[1].grad().unwrap()[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_clip_grad_norm_exactly_at_threshold() {
        let params = with_grads(&[&[3.0, 4.0]]);
        let before = grad_bits(&params);

        clip_grad_norm(&params, 5.0);

        assert_eq!(grad_bits(&params), before);
    }

    #[test]
    fn test_clip_grad_norm_skips_missing_grads() {
        let mut params = with_grads(&[&[3.0]]);
        params.push(Tensor::from_vec(vec![1.0], true));

        let global_norm = clip_grad_norm(&params, 1.0);

        assert_abs_diff_eq!(global_norm, 3.0, epsilon = 1e-6);
        assert!(params[1].grad().is_none());
    }

    #[test]
    fn test_clip_grad_norm_preserves_relative_magnitudes() {
        let params = with_grads(&[&[10.0], &[5.0]]);
        clip_grad_norm(&params, 1.0);

        let ratio = params[0].grad().unwrap()[0] / params[1].grad().unwrap()[0];
        assert_abs_diff_eq!(ratio, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_clip_grad_value_clamps() {
        let params = with_grads(&[&[-2.0, 0.25, 3.0]]);
        clip_grad_value(&params, 0.5);
        assert_eq!(params[0].grad().unwrap().to_vec(), vec![-0.5, 0.25, 0.5]);
    }

    #[test]
    fn test_clip_spec_threshold() {
        assert_eq!(ClipSpec::norm(1.0).threshold(), Some(1.0));
        assert_eq!(ClipSpec::value(0.0).threshold(), None);
        assert_eq!(ClipSpec::value(-1.0).threshold(), None);
        assert!(!ClipSpec::disabled().is_active());
    }

    #[test]
    fn test_clip_spec_apply_dispatches() {
        let params = with_grads(&[&[3.0, 4.0]]);
        assert_eq!(ClipSpec::norm(1.0).apply(&params), Some(5.0));

        let params = with_grads(&[&[3.0, -4.0]]);
        assert_eq!(ClipSpec::value(1.0).apply(&params), None);
        assert_eq!(params[0].grad().unwrap().to_vec(), vec![1.0, -1.0]);
    }

    #[test]
    fn test_clip_algorithm_serde() {
        let algo: GradClipAlgorithm = serde_json::from_str("\"value\"").unwrap();
        assert_eq!(algo, GradClipAlgorithm::Value);
        assert_eq!(GradClipAlgorithm::default(), GradClipAlgorithm::Norm);
    }

    fn grads_strategy() -> impl Strategy<Value = Vec<Vec<f32>>> {
        prop::collection::vec(prop::collection::vec(-100.0f32..100.0, 1..8), 1..6)
    }

    fn build(grads: &[Vec<f32>]) -> Vec<Tensor> {
        let slices: Vec<&[f32]> = grads.iter().map(Vec::as_slice).collect();
        with_grads(&slices)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_clip_value_bounds_and_idempotent(grads in grads_strategy(), t in 0.01f32..50.0) {
            let params = build(&grads);
            clip_grad_value(&params, t);
            for p in &params {
                for g in p.grad().unwrap().iter() {
                    prop_assert!(g.abs() <= t);
                }
            }

            let once = grad_bits(&params);
            clip_grad_value(&params, t);
            prop_assert_eq!(grad_bits(&params), once);
        }

        #[test]
        fn prop_clip_norm_bounds_total(grads in grads_strategy(), t in 0.01f32..50.0) {
            let params = build(&grads);
            let before_norm = total_grad_norm(&params);
            let before = grad_bits(&params);

            let reported = clip_grad_norm(&params, t);
            prop_assert_eq!(reported, before_norm);

            let after_norm = total_grad_norm(&params);
            prop_assert!(after_norm <= t * (1.0 + 1e-5));
            if before_norm <= t {
                prop_assert_eq!(grad_bits(&params), before);
            }
        }

        #[test]
        fn prop_non_positive_threshold_never_mutates(grads in grads_strategy(), t in -50.0f32..=0.0) {
            let params = build(&grads);
            let before = grad_bits(&params);

            clip_grad_value(&params, t);
            clip_grad_norm(&params, t);
            ClipSpec { value: Some(t), algorithm: GradClipAlgorithm::Value }.apply(&params);
            ClipSpec { value: None, algorithm: GradClipAlgorithm::Norm }.apply(&params);

            prop_assert_eq!(grad_bits(&params), before);
        }
    }
}
