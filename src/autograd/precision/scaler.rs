//! Dynamic loss scaler
//!
//! fp16 gradients underflow long before fp32 ones do. The scaler multiplies
//! the loss before backward, divides the gradients back afterwards, and
//! adapts the factor: it halves after a step whose gradients overflowed and
//! doubles after `growth_interval` consecutive finite steps.

use super::MixedPrecisionConfig;
use crate::autograd;
use crate::Tensor;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Loss scaler state; serializable so it can travel with a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    /// Consecutive finite steps since the last scale change
    growth_tracker: usize,
    dynamic: bool,
    overflow_count: usize,
    successful_steps: usize,
}

impl GradScaler {
    /// Dynamic scaler starting at `initial_scale` with the default factors
    pub fn new(initial_scale: f32) -> Self {
        Self::from_config(&MixedPrecisionConfig::fp16().with_initial_scale(initial_scale))
    }

    /// Scaler configured from `config`
    pub fn from_config(config: &MixedPrecisionConfig) -> Self {
        Self {
            scale: config.initial_scale,
            growth_factor: config.growth_factor,
            backoff_factor: config.backoff_factor,
            growth_interval: config.growth_interval,
            growth_tracker: 0,
            dynamic: config.dynamic,
            overflow_count: 0,
            successful_steps: 0,
        }
    }

    /// Current loss scale
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Multiply `loss` by the current scale, keeping it differentiable
    pub fn scale_loss(&self, loss: &Tensor) -> Tensor {
        autograd::scale(loss, self.scale)
    }

    /// Divide every gradient by the current scale, in place
    ///
    /// Tensors without a gradient are skipped. Returns true if any unscaled
    /// gradient is inf or NaN.
    pub fn unscale<'a, I>(&self, params: I) -> bool
    where
        I: IntoIterator<Item = &'a Tensor>,
    {
        let inv_scale = 1.0 / self.scale;
        let mut found_inf = false;

        for param in params {
            param.update_grad(|grad| {
                grad.mapv_inplace(|g| g * inv_scale);
                found_inf |= grad.iter().any(|g| !g.is_finite());
            });
        }

        found_inf
    }

    /// Adapt the scale after a step attempt
    pub fn update(&mut self, found_inf: bool) {
        if !self.dynamic {
            return;
        }

        if found_inf {
            self.overflow_count += 1;
            self.growth_tracker = 0;
            // scale never drops below 1
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            warn!(
                scale = self.scale,
                overflows = self.overflow_count,
                "gradient overflow, backing off loss scale"
            );
            return;
        }

        self.successful_steps += 1;
        self.growth_tracker += 1;
        if self.growth_tracker >= self.growth_interval {
            self.scale *= self.growth_factor;
            self.growth_tracker = 0;
            debug!(scale = self.scale, "growing loss scale");
        }
    }

    /// Consecutive finite steps since the last scale change
    pub fn growth_tracker(&self) -> usize {
        self.growth_tracker
    }

    /// Get overflow count
    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    /// Get successful step count
    pub fn successful_steps(&self) -> usize {
        self.successful_steps
    }

    /// Whether the scale adapts
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::from_config(&MixedPrecisionConfig::fp16())
    }
}
