//! Precision strategy construction from a spec

use super::schema::PrecisionSpec;
use crate::autograd::Precision;
use crate::plugin::{self, PrecisionPlugin};
use tracing::info;

/// Build the precision strategy a spec selects
pub fn build_plugin(spec: &PrecisionSpec) -> Box<dyn PrecisionPlugin> {
    let scaler = match spec.precision {
        Precision::Fp32 => None,
        _ => Some(spec.mixed_precision_config()),
    };
    let plugin = plugin::build_plugin(spec.precision, scaler);
    info!(precision = plugin.descriptor(), "built precision plugin");
    plugin
}
