//! YAML schema for precision and gradient settings

use crate::autograd::{MixedPrecisionConfig, Precision};
use crate::error::Result;
use crate::optim::{ClipSpec, GradClipAlgorithm, NormType};
use crate::plugin::{GradNormConfig, RunSettings, DEFAULT_GROUP_SEPARATOR};
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a precision from a YAML number (`16`) or string (`"bf16"`)
fn deserialize_precision_lenient<'de, D>(deserializer: D) -> std::result::Result<Precision, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(u32),
        Str(String),
    }

    let raw = match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(bits) => bits.to_string(),
        IntOrString::Str(s) => s,
    };
    raw.parse().map_err(serde::de::Error::custom)
}

/// Deserialize a bool from either a YAML boolean (`true`) or a quoted string (`"true"`)
fn deserialize_bool_lenient<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'true' or 'false', got '{other}'"
            ))),
        },
    }
}

/// Precision and gradient handling for a run
///
/// ```yaml
/// precision: 16
/// gradient_clip_val: 1.0
/// gradient_clip_algorithm: value
/// track_grad_norm: 2
/// scaler:
///   initial_scale: 1024.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionSpec {
    /// Training precision: 32, 16 or bf16
    #[serde(default, deserialize_with = "deserialize_precision_lenient")]
    pub precision: Precision,

    /// Clip threshold; absent or 0 disables clipping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_clip_val: Option<f32>,

    /// Clip by norm (default) or by value
    #[serde(default)]
    pub gradient_clip_algorithm: GradClipAlgorithm,

    /// Norm order to track; -1 disables tracking
    #[serde(default)]
    pub track_grad_norm: NormType,

    /// Separator between the norm prefix and the parameter name in metric keys
    #[serde(default = "default_separator")]
    pub group_separator: String,

    /// Loss scaling overrides (fp16 only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<ScalerSpec>,
}

fn default_separator() -> String {
    DEFAULT_GROUP_SEPARATOR.to_string()
}

impl Default for PrecisionSpec {
    fn default() -> Self {
        Self {
            precision: Precision::Fp32,
            gradient_clip_val: None,
            gradient_clip_algorithm: GradClipAlgorithm::Norm,
            track_grad_norm: NormType::Disabled,
            group_separator: default_separator(),
            scaler: None,
        }
    }
}

impl PrecisionSpec {
    /// Parse a spec from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Render the spec as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Clip and norm settings passed to every step
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            clip: ClipSpec {
                value: self.gradient_clip_val,
                algorithm: self.gradient_clip_algorithm,
            },
            grad_norm: GradNormConfig::new(self.track_grad_norm)
                .with_separator(self.group_separator.clone()),
        }
    }

    /// Loss scaling for the configured precision, with overrides applied
    pub fn mixed_precision_config(&self) -> MixedPrecisionConfig {
        let preset = MixedPrecisionConfig::for_precision(self.precision);
        match &self.scaler {
            Some(scaler) => scaler.apply(preset),
            None => preset,
        }
    }
}

/// Loss scaler overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerSpec {
    /// Starting loss scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_scale: Option<f32>,

    /// Scale multiplier after a run of finite steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_factor: Option<f32>,

    /// Scale multiplier after an overflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f32>,

    /// Finite steps between scale increases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_interval: Option<usize>,

    /// Whether the scale adapts at all
    #[serde(default = "default_true", deserialize_with = "deserialize_bool_lenient")]
    pub dynamic: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScalerSpec {
    fn default() -> Self {
        Self {
            initial_scale: None,
            growth_factor: None,
            backoff_factor: None,
            growth_interval: None,
            dynamic: true,
        }
    }
}

impl ScalerSpec {
    /// Apply the overrides on top of `config`
    pub fn apply(&self, mut config: MixedPrecisionConfig) -> MixedPrecisionConfig {
        if let Some(scale) = self.initial_scale {
            config.initial_scale = scale;
        }
        if let Some(factor) = self.growth_factor {
            config.growth_factor = factor;
        }
        if let Some(factor) = self.backoff_factor {
            config.backoff_factor = factor;
        }
        if let Some(interval) = self.growth_interval {
            config.growth_interval = interval;
        }
        config.dynamic = self.dynamic;
        config
    }
}
