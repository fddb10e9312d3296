//! Run-level settings the orchestrator passes to every step

use crate::optim::{ClipSpec, NormType};
use serde::{Deserialize, Serialize};

/// Default separator between the norm prefix and a parameter name
pub const DEFAULT_GROUP_SEPARATOR: &str = "/";

/// Gradient norm tracking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradNormConfig {
    /// Norm order; disabled by default
    #[serde(default)]
    pub norm_type: NormType,
    /// Separator used when building metric keys
    #[serde(default = "default_separator")]
    pub group_separator: String,
}

fn default_separator() -> String {
    DEFAULT_GROUP_SEPARATOR.to_string()
}

impl Default for GradNormConfig {
    fn default() -> Self {
        Self {
            norm_type: NormType::Disabled,
            group_separator: default_separator(),
        }
    }
}

impl GradNormConfig {
    /// Track norms of order `norm_type`
    pub fn new(norm_type: NormType) -> Self {
        Self {
            norm_type,
            ..Self::default()
        }
    }

    /// Use a custom key separator
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.group_separator = separator.into();
        self
    }

    /// Whether tracking is on
    pub fn is_enabled(&self) -> bool {
        !self.norm_type.is_disabled()
    }
}

/// Clipping and norm tracking for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Gradient clipping
    #[serde(default)]
    pub clip: ClipSpec,
    /// Gradient norm tracking
    #[serde(default)]
    pub grad_norm: GradNormConfig,
}

impl RunSettings {
    /// Settings with clipping only
    pub fn with_clip(clip: ClipSpec) -> Self {
        Self {
            clip,
            ..Self::default()
        }
    }

    /// Enable gradient norm tracking
    pub fn with_grad_norm(mut self, grad_norm: GradNormConfig) -> Self {
        self.grad_norm = grad_norm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::GradClipAlgorithm;

    #[test]
    fn test_defaults_disable_everything() {
        let settings = RunSettings::default();
        assert!(!settings.clip.is_active());
        assert!(!settings.grad_norm.is_enabled());
        assert_eq!(settings.grad_norm.group_separator, "/");
    }

    #[test]
    fn test_builders() {
        let settings = RunSettings::with_clip(ClipSpec::value(0.5))
            .with_grad_norm(GradNormConfig::new(NormType::P(2.0)).with_separator("."));

        assert_eq!(settings.clip.algorithm, GradClipAlgorithm::Value);
        assert!(settings.grad_norm.is_enabled());
        assert_eq!(settings.grad_norm.group_separator, ".");
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = "clip:\n  value: 1.0\ngrad_norm:\n  norm_type: inf\n";
        let settings: RunSettings = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(settings.clip.threshold(), Some(1.0));
        assert_eq!(settings.clip.algorithm, GradClipAlgorithm::Norm);
        assert_eq!(settings.grad_norm.norm_type, NormType::Inf);
        assert_eq!(settings.grad_norm.group_separator, "/");
    }
}
