//! Precision spec validation

use super::schema::PrecisionSpec;
use crate::autograd::Precision;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid gradient clip value: {0} (must be >= 0.0, 0 disables clipping)")]
    InvalidGradClip(f32),

    #[error("Invalid initial loss scale: {0} (must be > 0.0)")]
    InvalidInitialScale(f32),

    #[error("Invalid scale growth factor: {0} (must be > 1.0)")]
    InvalidGrowthFactor(f32),

    #[error("Invalid scale backoff factor: {0} (must be in (0.0, 1.0))")]
    InvalidBackoffFactor(f32),

    #[error("Invalid scale growth interval: {0} (must be > 0)")]
    InvalidGrowthInterval(usize),

    #[error("Loss scaler configured for precision {0} (only 16 uses loss scaling)")]
    ScalerWithoutFp16(Precision),
}

/// Validate a precision spec
///
/// Checks:
/// - Clip threshold is finite and not negative
/// - Scaler overrides are in range and only given for fp16
pub fn validate_spec(spec: &PrecisionSpec) -> Result<(), ValidationError> {
    if let Some(clip) = spec.gradient_clip_val {
        if !clip.is_finite() || clip < 0.0 {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }

    let Some(scaler) = &spec.scaler else {
        return Ok(());
    };

    if spec.precision != Precision::Fp16 {
        return Err(ValidationError::ScalerWithoutFp16(spec.precision));
    }

    if let Some(scale) = scaler.initial_scale {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(ValidationError::InvalidInitialScale(scale));
        }
    }

    if let Some(factor) = scaler.growth_factor {
        if !(factor > 1.0) {
            return Err(ValidationError::InvalidGrowthFactor(factor));
        }
    }

    if let Some(factor) = scaler.backoff_factor {
        if !(factor > 0.0 && factor < 1.0) {
            return Err(ValidationError::InvalidBackoffFactor(factor));
        }
    }

    if let Some(interval) = scaler.growth_interval {
        if interval == 0 {
            return Err(ValidationError::InvalidGrowthInterval(interval));
        }
    }

    Ok(())
}
