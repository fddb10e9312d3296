//! Precision strategies for the per-step training hooks
//!
//! A [`PrecisionPlugin`] decides how backward and the optimizer step run
//! numerically, applies the clipping policy before the optimizer consumes
//! gradients, and brackets forward computation in scoped contexts.
//!
//! Within one optimization step the hooks run strictly in this order:
//!
//! 1. [`PrecisionPlugin::pre_backward`]
//! 2. [`PrecisionPlugin::backward`]
//! 3. [`PrecisionPlugin::post_backward`]
//! 4. [`PrecisionPlugin::pre_optimizer_step`] (norm tracking, then clipping)
//! 5. [`PrecisionPlugin::optimizer_step`]
//!
//! [`crate::step::run_optimization_step`] drives that sequence for one
//! optimizer.

mod full;
pub mod hooks;
pub mod lifecycle;
mod mixed;
pub mod model;
pub mod scope;
mod settings;
mod state;

#[cfg(test)]
pub(crate) mod test_utils;

pub use full::FullPrecision;
pub use hooks::{GradNormSink, HookRegistry, InMemorySink, StepHook, TracingSink};
pub use lifecycle::{dispatch_run, RunStage};
pub use mixed::{MixedPrecision, SCALER_STATE_KEY};
pub use model::{BackwardArgs, ClosureResult, ModelHandle, Module, StepOutcome, TrainableModule};
pub use scope::{ExecutionPhase, ExecutionScope, ScopeGuard};
pub use settings::{GradNormConfig, RunSettings, DEFAULT_GROUP_SEPARATOR};
pub use state::{BackendPredicate, PluginCore};

use crate::autograd::{MixedPrecisionConfig, Precision};
use crate::error::Result;
use crate::optim::{
    self, clip_grad_norm, clip_grad_value, grad_norm, ClipSpec, GradClipAlgorithm, Optimizer,
    ParamView,
};
use crate::Tensor;
use hooks::BEFORE_OPTIMIZER_STEP;
use tracing::debug;

/// Strategy-specific state saved alongside a checkpoint
pub type Checkpoint = serde_json::Map<String, serde_json::Value>;

/// Gradient clipping over an optimizer's parameters
pub trait GradientClipper {
    /// Parameters the optimizer updates
    ///
    /// Plain parameters by default; a strategy keeping separate master
    /// weights returns those instead.
    fn master_params<'a>(&self, optimizer: &'a dyn Optimizer) -> ParamView<'a> {
        optim::params(optimizer)
    }

    /// Clamp every gradient element into `[-clip_value, clip_value]`
    fn clip_grad_by_value(&self, optimizer: &dyn Optimizer, clip_value: f32) {
        clip_grad_value(self.master_params(optimizer), clip_value);
    }

    /// Rescale gradients so their aggregate L2 norm is at most `max_norm`
    ///
    /// Returns the norm before clipping.
    fn clip_grad_by_norm(&self, optimizer: &dyn Optimizer, max_norm: f32) -> f32 {
        clip_grad_norm(self.master_params(optimizer), max_norm)
    }

    /// Apply `clip`; absent or non-positive thresholds do nothing
    fn apply_clip(&self, optimizer: &dyn Optimizer, clip: &ClipSpec) {
        let Some(threshold) = clip.threshold() else {
            return;
        };
        match clip.algorithm {
            GradClipAlgorithm::Value => self.clip_grad_by_value(optimizer, threshold),
            GradClipAlgorithm::Norm => {
                self.clip_grad_by_norm(optimizer, threshold);
            }
        }
    }
}

/// View of any clipper as a trait object
pub trait AsClipper {
    /// `self` as `&dyn GradientClipper`
    fn as_clipper(&self) -> &dyn GradientClipper;
}

impl<T: GradientClipper> AsClipper for T {
    fn as_clipper(&self) -> &dyn GradientClipper {
        self
    }
}

/// Hooks a precision strategy provides to the training loop
///
/// Every hook has a default matching full-precision training; a strategy
/// overrides only what it changes. Failures from the model's backward or the
/// optimizer's step propagate unchanged.
pub trait PrecisionPlugin: GradientClipper + AsClipper {
    /// Precision this strategy trains at; fixed for the instance's lifetime
    fn precision(&self) -> Precision;

    /// Shared listeners and scope state
    fn core(&self) -> &PluginCore;

    /// Mutable shared state
    fn core_mut(&mut self) -> &mut PluginCore;

    /// Short descriptor: "32", "16" or "bf16"
    fn descriptor(&self) -> &'static str {
        self.precision().descriptor()
    }

    /// Attach the strategy to the run's optimizers
    ///
    /// Identity by default; a strategy that wraps optimizers returns the
    /// wrapped ones.
    fn connect(&mut self, optimizers: Vec<Box<dyn Optimizer>>) -> Vec<Box<dyn Optimizer>> {
        optimizers
    }

    /// Prepare the loss for differentiation
    fn pre_backward(&mut self, model: &mut ModelHandle<'_>, loss: Tensor) -> Tensor {
        self.core_mut().notify_before_backward(model, &loss);
        loss
    }

    /// Run backward, through the model when it is a full model
    fn backward(
        &mut self,
        model: &mut ModelHandle<'_>,
        loss: &Tensor,
        optimizer: Option<&mut dyn Optimizer>,
        args: &BackwardArgs,
    ) -> Result<()> {
        match model.trainable_mut() {
            Some(model) => model.backward(loss, optimizer, args),
            None => self.run_backward(loss, args),
        }
    }

    /// Tensor-level backward used without a full model
    fn run_backward(&mut self, loss: &Tensor, args: &BackwardArgs) -> Result<()> {
        loss.backward_with(args.grad_output.clone())
    }

    /// Release the graph behind `loss` and notify listeners
    fn post_backward(&mut self, model: &mut ModelHandle<'_>, loss: &Tensor) -> Tensor {
        let loss = loss.detach();
        self.core_mut().notify_after_backward(model);
        loss
    }

    /// Track norms, clip, then announce the step
    fn pre_optimizer_step(
        &mut self,
        model: &mut ModelHandle<'_>,
        optimizer: &dyn Optimizer,
        optimizer_idx: usize,
        settings: &RunSettings,
        sink: &mut dyn GradNormSink,
    ) -> Result<()> {
        pre_optimizer_step_default(self, model, optimizer, optimizer_idx, settings, sink)
    }

    /// Step the optimizer unless there is nothing to step
    fn optimizer_step(
        &mut self,
        model: &ModelHandle<'_>,
        optimizer: &mut dyn Optimizer,
        optimizer_idx: usize,
        closure_result: &ClosureResult,
    ) -> Result<StepOutcome> {
        optimizer_step_default(model, optimizer, optimizer_idx, closure_result)
    }

    /// Report gradient norms of the model's parameters
    ///
    /// Does nothing when tracking is disabled or no parameter has a gradient.
    fn track_grad_norm(
        &self,
        model: &ModelHandle<'_>,
        config: &GradNormConfig,
        sink: &mut dyn GradNormSink,
    ) -> Result<()> {
        if !config.is_enabled() {
            return Ok(());
        }
        let norms = grad_norm(&model.named_parameters(), config.norm_type, &config.group_separator)?;
        if !norms.is_empty() {
            sink.log_grad_norm(BEFORE_OPTIMIZER_STEP, &norms);
        }
        Ok(())
    }

    /// Clip gate
    ///
    /// Skipped when the backend clips on its own or there is no full model;
    /// otherwise the model's clipping override decides.
    fn clip_gradients(
        &self,
        optimizer: &dyn Optimizer,
        optimizer_idx: usize,
        clip: &ClipSpec,
        model: Option<&mut dyn TrainableModule>,
    ) {
        if self.core().backend_clips() {
            debug!(optimizer_idx, "backend clips gradients itself, skipping");
            return;
        }
        let Some(model) = model else {
            return;
        };
        model.configure_gradient_clipping(optimizer, optimizer_idx, clip, self.as_clipper());
    }

    /// Before the run starts
    fn pre_dispatch(&mut self) {}

    /// When the run is dispatched
    fn dispatch(&mut self, _stage: RunStage) {}

    /// After the run finishes
    fn post_dispatch(&mut self) {}

    /// Scope around any model forward
    fn forward_context(&self) -> ScopeGuard {
        ScopeGuard::enter(self.core().scope(), ExecutionPhase::Forward)
    }

    /// Scope around a training step
    fn train_step_context(&self) -> ScopeGuard {
        self.forward_context().nest(ExecutionPhase::Train)
    }

    /// Scope around a validation step
    fn validation_step_context(&self) -> ScopeGuard {
        self.forward_context().nest(ExecutionPhase::Validate)
    }

    /// Scope around a test step
    fn test_step_context(&self) -> ScopeGuard {
        self.forward_context().nest(ExecutionPhase::Test)
    }

    /// Scope around a prediction step
    fn predict_step_context(&self) -> ScopeGuard {
        self.forward_context().nest(ExecutionPhase::Predict)
    }

    /// Scope for `phase`, routed through the phase's own context
    fn phase_context(&self, phase: ExecutionPhase) -> ScopeGuard {
        match phase {
            ExecutionPhase::Forward => self.forward_context(),
            ExecutionPhase::Train => self.train_step_context(),
            ExecutionPhase::Validate => self.validation_step_context(),
            ExecutionPhase::Test => self.test_step_context(),
            ExecutionPhase::Predict => self.predict_step_context(),
        }
    }

    /// Add strategy state to a checkpoint
    fn on_save_checkpoint(&self, _checkpoint: &mut Checkpoint) -> Result<()> {
        Ok(())
    }

    /// Restore strategy state from a checkpoint
    fn on_load_checkpoint(&mut self, _checkpoint: &Checkpoint) -> Result<()> {
        Ok(())
    }
}

/// Base pre-optimizer-step sequence
///
/// Norms are tracked for the first optimizer only, and always before
/// clipping. Strategies that override
/// [`PrecisionPlugin::pre_optimizer_step`] call this to keep the base order.
pub fn pre_optimizer_step_default<P>(
    plugin: &mut P,
    model: &mut ModelHandle<'_>,
    optimizer: &dyn Optimizer,
    optimizer_idx: usize,
    settings: &RunSettings,
    sink: &mut dyn GradNormSink,
) -> Result<()>
where
    P: PrecisionPlugin + ?Sized,
{
    if optimizer_idx == 0 {
        plugin.track_grad_norm(model, &settings.grad_norm, sink)?;
    }
    plugin.clip_gradients(optimizer, optimizer_idx, &settings.clip, model.trainable_mut());
    if model.is_full() {
        plugin
            .core_mut()
            .notify_before_optimizer_step(model, optimizer, optimizer_idx);
    }
    Ok(())
}

/// Base optimizer step
///
/// Under automatic optimization a skipped backward means there is nothing to
/// step. Manual optimization always steps.
pub fn optimizer_step_default(
    model: &ModelHandle<'_>,
    optimizer: &mut dyn Optimizer,
    optimizer_idx: usize,
    closure_result: &ClosureResult,
) -> Result<StepOutcome> {
    if model.automatic_optimization() && closure_result.is_skipped() {
        debug!(
            optimizer = optimizer.name(),
            optimizer_idx, "backward was skipped, not stepping"
        );
        return Ok(StepOutcome::SkippedBackward);
    }
    optimizer.step()?;
    Ok(StepOutcome::Stepped)
}

/// Strategy for `precision`
///
/// Full precision for fp32, mixed precision otherwise. `scaler` overrides the
/// loss-scaling preset of the reduced precision.
pub fn build_plugin(
    precision: Precision,
    scaler: Option<MixedPrecisionConfig>,
) -> Box<dyn PrecisionPlugin> {
    match precision {
        Precision::Fp32 => Box::new(FullPrecision::new()),
        reduced => {
            let config = scaler.unwrap_or_else(|| MixedPrecisionConfig::for_precision(reduced));
            Box::new(MixedPrecision::with_config(reduced, &config))
        }
    }
}
