//! Single optimization step driver
//!
//! Runs one optimizer's closure and step through a [`PrecisionPlugin`] in the
//! fixed order: pre-backward, backward, post-backward, pre-optimizer-step,
//! optimizer-step.

use crate::error::Result;
use crate::optim::Optimizer;
use crate::plugin::{
    BackwardArgs, ClosureResult, GradNormSink, ModelHandle, PrecisionPlugin, RunSettings,
    StepOutcome,
};
use crate::Tensor;
use tracing::trace;

/// Result of one optimization step
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Detached loss as the closure returned it, before any loss scaling;
    /// `None` when backward was skipped
    pub loss: Option<Tensor>,
    /// What the optimizer step did
    pub outcome: StepOutcome,
}

impl StepReport {
    /// Loss value, if backward ran
    pub fn loss_value(&self) -> Option<f32> {
        self.loss.as_ref().map(Tensor::item)
    }
}

/// Run one optimization step for `optimizer`
///
/// `closure` computes the loss inside the training step context. Returning
/// `None` marks backward as skipped, e.g. when a manually optimized model
/// already ran its own backward. Errors from the closure, backward or the
/// optimizer are returned unchanged.
pub fn run_optimization_step<P, F>(
    plugin: &mut P,
    model: &mut ModelHandle<'_>,
    optimizer: &mut dyn Optimizer,
    optimizer_idx: usize,
    settings: &RunSettings,
    sink: &mut dyn GradNormSink,
    closure: F,
) -> Result<StepReport>
where
    P: PrecisionPlugin + ?Sized,
    F: FnOnce(&mut ModelHandle<'_>) -> Result<Option<Tensor>>,
{
    let loss = plugin.train_step_context().run(|| closure(&mut *model))?;

    let closure_result = match loss {
        Some(loss) => {
            // a strategy may scale the loss for backward; the step keeps the
            // value the closure produced
            let step_loss = loss.detach();
            let loss = plugin.pre_backward(model, loss);
            let step_optimizer: &mut dyn Optimizer = &mut *optimizer;
            plugin.backward(model, &loss, Some(step_optimizer), &BackwardArgs::default())?;
            plugin.post_backward(model, &loss);
            ClosureResult::Loss(step_loss)
        }
        None => {
            trace!(optimizer_idx, "closure skipped backward");
            ClosureResult::Skipped
        }
    };

    plugin.pre_optimizer_step(model, &*optimizer, optimizer_idx, settings, sink)?;
    let outcome = plugin.optimizer_step(model, optimizer, optimizer_idx, &closure_result)?;

    Ok(StepReport {
        loss: closure_result.loss().cloned(),
        outcome,
    })
}
