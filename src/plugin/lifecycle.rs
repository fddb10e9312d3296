//! Run-level lifecycle hooks

use super::PrecisionPlugin;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Kind of run being dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    /// Training (with optional validation)
    Fit,
    /// Validation only
    Validate,
    /// Testing
    Test,
    /// Prediction
    Predict,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Fit => "fit",
            RunStage::Validate => "validate",
            RunStage::Test => "test",
            RunStage::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// Run `body` between the dispatch hooks
///
/// `pre_dispatch` and `dispatch` fire once before `body`; `post_dispatch`
/// fires once after it, also when `body` fails. The body's result is
/// returned unchanged.
pub fn dispatch_run<P, R, F>(plugin: &mut P, stage: RunStage, body: F) -> Result<R>
where
    P: PrecisionPlugin + ?Sized,
    F: FnOnce(&mut P) -> Result<R>,
{
    info!(%stage, precision = plugin.descriptor(), "dispatching run");
    plugin.pre_dispatch();
    plugin.dispatch(stage);

    let result = body(plugin);

    plugin.post_dispatch();
    info!(%stage, ok = result.is_ok(), "run finished");
    result
}
