//! Full (fp32) precision strategy

use super::{GradientClipper, PluginCore, PrecisionPlugin};
use crate::autograd::Precision;

/// Plain fp32 training; every hook keeps its default behavior
#[derive(Debug, Default)]
pub struct FullPrecision {
    core: PluginCore,
}

impl FullPrecision {
    /// Create a full-precision strategy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a prepared core (listeners, clip bypass)
    pub fn with_core(core: PluginCore) -> Self {
        Self { core }
    }
}

impl GradientClipper for FullPrecision {}

impl PrecisionPlugin for FullPrecision {
    fn precision(&self) -> Precision {
        Precision::Fp32
    }

    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }
}
