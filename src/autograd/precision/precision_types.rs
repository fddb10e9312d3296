//! Precision levels

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data type precision levels
///
/// Also serves as the immutable descriptor of a precision strategy: "32",
/// "16" (fp16 mixed) or "bf16" (bf16 mixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 32-bit floating point (default)
    #[default]
    #[serde(rename = "32", alias = "fp32")]
    Fp32,
    /// 16-bit floating point (IEEE half precision)
    #[serde(rename = "16", alias = "fp16")]
    Fp16,
    /// 16-bit brain floating point (truncated mantissa)
    #[serde(rename = "bf16")]
    Bf16,
}

impl Precision {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
        }
    }

    /// Strategy descriptor as written in configs
    pub fn descriptor(&self) -> &'static str {
        match self {
            Precision::Fp32 => "32",
            Precision::Fp16 => "16",
            Precision::Bf16 => "bf16",
        }
    }

    /// fp16 or bf16
    pub fn is_reduced(&self) -> bool {
        matches!(self, Precision::Fp16 | Precision::Bf16)
    }

    /// Round a value through this precision and back to f32
    pub fn round(&self, value: f32) -> f32 {
        match self {
            Precision::Fp32 => value,
            Precision::Fp16 => half::f16::from_f32(value).to_f32(),
            Precision::Bf16 => half::bf16::from_f32(value).to_f32(),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "32" | "fp32" => Ok(Precision::Fp32),
            "16" | "fp16" => Ok(Precision::Fp16),
            "bf16" => Ok(Precision::Bf16),
            other => Err(Error::ConfigError(format!(
                "unknown precision '{other}' (must be one of: 32, 16, bf16)"
            ))),
        }
    }
}
