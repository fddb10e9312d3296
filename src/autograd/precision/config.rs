//! Loss-scaling configuration for reduced-precision training

use super::Precision;
use serde::{Deserialize, Serialize};

/// Starting loss scale for fp16 (2^16)
pub const DEFAULT_INITIAL_SCALE: f32 = 65536.0;

/// Finite steps between scale increases
pub const DEFAULT_GROWTH_INTERVAL: usize = 2000;

/// Compute precision plus the loss scaler settings that go with it
///
/// Master weights always stay fp32; only activations and gradients use the
/// reduced precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedPrecisionConfig {
    /// Precision for activations and gradients
    pub precision: Precision,
    /// Loss scale before the first step
    pub initial_scale: f32,
    /// Scale multiplier after `growth_interval` finite steps
    pub growth_factor: f32,
    /// Scale multiplier after an overflow
    pub backoff_factor: f32,
    /// Finite steps between scale increases
    pub growth_interval: usize,
    /// Whether the scale adapts to overflows at all
    pub dynamic: bool,
}

impl MixedPrecisionConfig {
    /// Preset for a precision level
    ///
    /// Only fp16 needs dynamic scaling: fp32 and bf16 share the f32 exponent
    /// range, so their scale stays at 1.
    pub fn for_precision(precision: Precision) -> Self {
        let fp16 = precision == Precision::Fp16;
        Self {
            precision,
            initial_scale: if fp16 { DEFAULT_INITIAL_SCALE } else { 1.0 },
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: DEFAULT_GROWTH_INTERVAL,
            dynamic: fp16,
        }
    }

    /// fp16 preset
    pub fn fp16() -> Self {
        Self::for_precision(Precision::Fp16)
    }

    /// bf16 preset
    pub fn bf16() -> Self {
        Self::for_precision(Precision::Bf16)
    }

    /// Whether compute runs below fp32
    pub fn is_mixed(&self) -> bool {
        self.precision.is_reduced()
    }

    /// Set initial loss scale
    pub fn with_initial_scale(mut self, scale: f32) -> Self {
        self.initial_scale = scale;
        self
    }

    /// Enable/disable dynamic scaling
    pub fn with_dynamic_scaling(mut self, enabled: bool) -> Self {
        self.dynamic = enabled;
        self
    }

    /// Set the number of clean steps before the scale grows
    pub fn with_growth_interval(mut self, steps: usize) -> Self {
        self.growth_interval = steps;
        self
    }
}

impl Default for MixedPrecisionConfig {
    fn default() -> Self {
        Self::for_precision(Precision::Fp32)
    }
}
