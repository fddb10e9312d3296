//! Gradient norm statistics for logging

use crate::error::{Error, Result};
use crate::Tensor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Gradient norms keyed by metric name
pub type GradNormDict = BTreeMap<String, f32>;

/// Value of `track_grad_norm` that turns tracking off
pub const DISABLED_NORM: f32 = -1.0;

/// Which p-norm to track
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NormType {
    /// Tracking disabled (configured as `-1`)
    #[default]
    Disabled,
    /// p-norm for a finite positive p
    P(f32),
    /// Max-abs norm
    Inf,
}

impl NormType {
    /// Interpret a configured number
    ///
    /// `-1` disables tracking, positive values select a p-norm and
    /// `f32::INFINITY` selects the max norm. Anything else is rejected.
    pub fn from_value(value: f32) -> Result<Self> {
        if value == DISABLED_NORM {
            Ok(NormType::Disabled)
        } else if value == f32::INFINITY {
            Ok(NormType::Inf)
        } else if value > 0.0 {
            Ok(NormType::P(value))
        } else {
            Err(Error::InvalidParameter(format!(
                "norm type must be a positive number, 'inf' or -1 to disable, got {value}"
            )))
        }
    }

    /// Whether tracking is off
    pub fn is_disabled(&self) -> bool {
        matches!(self, NormType::Disabled)
    }

    /// Numeric value as configured
    pub fn as_f32(&self) -> f32 {
        match self {
            NormType::Disabled => DISABLED_NORM,
            NormType::P(p) => *p,
            NormType::Inf => f32::INFINITY,
        }
    }

    /// Norm of a sequence of values
    fn apply<I: IntoIterator<Item = f32>>(&self, values: I) -> f32 {
        match self {
            NormType::Inf => values.into_iter().fold(0.0f32, |acc, v| acc.max(v.abs())),
            NormType::P(p) => {
                let p = f64::from(*p);
                let sum: f64 = values.into_iter().map(|v| f64::from(v.abs()).powf(p)).sum();
                sum.powf(1.0 / p) as f32
            }
            NormType::Disabled => 0.0,
        }
    }
}

/// Renders like the metric key fragment: `2.0`, `1.5`, `inf`
impl fmt::Display for NormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormType::Inf => write!(f, "inf"),
            other => write!(f, "{:?}", other.as_f32()),
        }
    }
}

impl Serialize for NormType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            NormType::Inf => serializer.serialize_str("inf"),
            other => serializer.serialize_f32(other.as_f32()),
        }
    }
}

impl<'de> Deserialize<'de> for NormType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumberOrString {
            Number(f32),
            Str(String),
        }

        let value = match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => n,
            NumberOrString::Str(s) => match s.trim().to_lowercase().as_str() {
                "inf" => f32::INFINITY,
                other => other.parse::<f32>().map_err(|_| {
                    serde::de::Error::custom(format!("expected a number or 'inf', got '{other}'"))
                })?,
            },
        };
        NormType::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn round4(value: f32) -> f32 {
    (value * 1e4).round() / 1e4
}

/// Per-parameter and total gradient norms
///
/// Produces `grad_{p}_norm{separator}{name}` for every parameter that has a
/// gradient, plus `grad_{p}_norm_total` (the norm of the per-parameter
/// norms). Values are rounded to 4 decimals; parameters without gradients
/// are skipped, so a model with no gradients yields an empty dictionary.
pub fn grad_norm(
    named_params: &[(String, Tensor)],
    norm_type: NormType,
    separator: &str,
) -> Result<GradNormDict> {
    if norm_type.is_disabled() {
        return Err(Error::InvalidParameter(
            "grad_norm called with tracking disabled".into(),
        ));
    }

    let raw: Vec<(String, f32)> = named_params
        .iter()
        .filter_map(|(name, param)| {
            param.grad().map(|grad| {
                let key = format!("grad_{norm_type}_norm{separator}{name}");
                (key, norm_type.apply(grad.iter().copied()))
            })
        })
        .collect();

    let mut norms = GradNormDict::new();
    if raw.is_empty() {
        return Ok(norms);
    }

    let total = norm_type.apply(raw.iter().map(|(_, v)| *v));
    for (key, value) in raw {
        norms.insert(key, round4(value));
    }
    norms.insert(format!("grad_{norm_type}_norm_total"), round4(total));
    Ok(norms)
}
