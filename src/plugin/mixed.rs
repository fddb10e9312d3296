//! Mixed precision strategy (fp16 with loss scaling, or bf16)
//!
//! Forward runs under autocast at the reduced precision. For fp16 the loss is
//! multiplied by the scaler's current scale before backward, gradients are
//! unscaled before norm tracking and clipping see them, and steps with
//! non-finite gradients are skipped while the scale backs off. bf16 keeps
//! the f32 exponent range and runs without a scaler.

use super::{
    optimizer_step_default, pre_optimizer_step_default, Checkpoint, ClosureResult, ExecutionPhase,
    GradNormSink, GradientClipper, ModelHandle, PluginCore, PrecisionPlugin, RunSettings,
    ScopeGuard, StepOutcome,
};
use crate::autograd::{GradScaler, MixedPrecisionConfig, Precision};
use crate::error::{Error, Result};
use crate::optim::Optimizer;
use crate::Tensor;
use std::rc::Rc;
use tracing::debug;

/// Checkpoint key holding the loss scaler state
pub const SCALER_STATE_KEY: &str = "native_amp_scaling_state";

/// Mixed precision training strategy
#[derive(Debug)]
pub struct MixedPrecision {
    core: PluginCore,
    precision: Precision,
    scaler: Option<GradScaler>,
    found_inf: bool,
}

impl MixedPrecision {
    /// Strategy for `precision` with its default scaler preset
    pub fn new(precision: Precision) -> Result<Self> {
        if !precision.is_reduced() {
            return Err(Error::ConfigError(format!(
                "mixed precision needs a reduced precision, got {precision}"
            )));
        }
        Ok(Self::with_config(precision, &MixedPrecisionConfig::for_precision(precision)))
    }

    /// Strategy for `precision` with loss scaling from `config`
    ///
    /// Only fp16 gets a scaler.
    pub fn with_config(precision: Precision, config: &MixedPrecisionConfig) -> Self {
        let scaler = (precision == Precision::Fp16).then(|| GradScaler::from_config(config));
        Self {
            core: PluginCore::new(),
            precision,
            scaler,
            found_inf: false,
        }
    }

    /// Replace the shared core (listeners, clip bypass)
    pub fn with_core(mut self, core: PluginCore) -> Self {
        self.core = core;
        self
    }

    /// Loss scaler, present for fp16 only
    pub fn scaler(&self) -> Option<&GradScaler> {
        self.scaler.as_ref()
    }

    /// Whether the last unscale found inf/NaN gradients
    pub fn found_inf(&self) -> bool {
        self.found_inf
    }
}

impl GradientClipper for MixedPrecision {}

impl PrecisionPlugin for MixedPrecision {
    fn precision(&self) -> Precision {
        self.precision
    }

    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn pre_backward(&mut self, model: &mut ModelHandle<'_>, loss: Tensor) -> Tensor {
        let loss = match &self.scaler {
            Some(scaler) => scaler.scale_loss(&loss),
            None => loss,
        };
        self.core.notify_before_backward(model, &loss);
        loss
    }

    fn pre_optimizer_step(
        &mut self,
        model: &mut ModelHandle<'_>,
        optimizer: &dyn Optimizer,
        optimizer_idx: usize,
        settings: &RunSettings,
        sink: &mut dyn GradNormSink,
    ) -> Result<()> {
        if let Some(scaler) = &self.scaler {
            self.found_inf = scaler.unscale(self.master_params(optimizer));
        }
        pre_optimizer_step_default(self, model, optimizer, optimizer_idx, settings, sink)
    }

    fn optimizer_step(
        &mut self,
        model: &ModelHandle<'_>,
        optimizer: &mut dyn Optimizer,
        optimizer_idx: usize,
        closure_result: &ClosureResult,
    ) -> Result<StepOutcome> {
        let Some(scaler) = self.scaler.as_mut() else {
            return optimizer_step_default(model, optimizer, optimizer_idx, closure_result);
        };
        if model.automatic_optimization() && closure_result.is_skipped() {
            return Ok(StepOutcome::SkippedBackward);
        }

        let overflow = std::mem::take(&mut self.found_inf);
        let outcome = if overflow {
            debug!(optimizer_idx, scale = scaler.scale(), "non-finite gradients, skipping step");
            StepOutcome::SkippedOverflow
        } else {
            optimizer.step()?;
            StepOutcome::Stepped
        };
        scaler.update(overflow);
        Ok(outcome)
    }

    fn forward_context(&self) -> ScopeGuard {
        let scope = Rc::clone(self.core.scope());
        let previous = scope.set_autocast(Some(self.precision));
        let restore = Rc::clone(&scope);
        ScopeGuard::enter(&scope, ExecutionPhase::Forward).with_teardown(move || {
            restore.set_autocast(previous);
        })
    }

    fn on_save_checkpoint(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        if let Some(scaler) = &self.scaler {
            checkpoint.insert(SCALER_STATE_KEY.to_string(), serde_json::to_value(scaler)?);
        }
        Ok(())
    }

    fn on_load_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if let (Some(scaler), Some(state)) = (self.scaler.as_mut(), checkpoint.get(SCALER_STATE_KEY)) {
            *scaler = serde_json::from_value(state.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::test_utils::{Event, InstrumentedModel, RecordingOptimizer};
    use crate::plugin::InMemorySink;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_new_rejects_full_precision() {
        assert!(MixedPrecision::new(Precision::Fp32).is_err());
        assert!(MixedPrecision::new(Precision::Fp16).is_ok());
    }

    #[test]
    fn test_scaler_only_for_fp16() {
        let fp16 = MixedPrecision::new(Precision::Fp16).unwrap();
        assert_eq!(fp16.scaler().unwrap().scale(), 65536.0);
        assert_eq!(fp16.descriptor(), "16");

        let bf16 = MixedPrecision::new(Precision::Bf16).unwrap();
        assert!(bf16.scaler().is_none());
        assert_eq!(bf16.descriptor(), "bf16");
    }

    #[test]
    fn test_pre_backward_scales_loss() {
        let config = MixedPrecisionConfig::fp16().with_initial_scale(8.0);
        let mut plugin = MixedPrecision::with_config(Precision::Fp16, &config);
        let model = InstrumentedModel::new(&[2]);
        let mut handle = ModelHandle::Bare(&model);

        let loss = Tensor::from_vec(vec![1.5], true);
        let scaled = plugin.pre_backward(&mut handle, loss);

        assert_abs_diff_eq!(scaled.item(), 12.0);
    }

    #[test]
    fn test_unscale_happens_before_norm_tracking() {
        let config = MixedPrecisionConfig::fp16().with_initial_scale(4.0);
        let mut plugin = MixedPrecision::with_config(Precision::Fp16, &config);
        let mut model = InstrumentedModel::new(&[1]);
        model.params()[0].set_grad(ndarray::arr1(&[8.0]));
        let optimizer = RecordingOptimizer::new(vec![model.params().to_vec()], model.log());
        let settings = RunSettings::default().with_grad_norm(crate::plugin::GradNormConfig::new(
            crate::optim::NormType::P(2.0),
        ));
        let mut sink = InMemorySink::new();

        let mut handle = ModelHandle::Full(&mut model);
        plugin
            .pre_optimizer_step(&mut handle, &optimizer, 0, &settings, &mut sink)
            .unwrap();

        assert!(!plugin.found_inf());
        assert_eq!(sink.last().unwrap()["grad_2.0_norm_total"], 2.0);
    }

    #[test]
    fn test_overflow_skips_step_and_backs_off() {
        let config = MixedPrecisionConfig::fp16().with_initial_scale(1024.0);
        let mut plugin = MixedPrecision::with_config(Precision::Fp16, &config);
        let mut model = InstrumentedModel::new(&[2]);
        model.params()[0].set_grad(ndarray::arr1(&[f32::INFINITY, 1.0]));
        let mut optimizer = RecordingOptimizer::new(vec![model.params().to_vec()], model.log());
        let mut sink = InMemorySink::new();

        let mut handle = ModelHandle::Full(&mut model);
        plugin
            .pre_optimizer_step(&mut handle, &optimizer, 0, &RunSettings::default(), &mut sink)
            .unwrap();
        assert!(plugin.found_inf());

        let loss = ClosureResult::Loss(Tensor::from_vec(vec![1.0], false));
        let outcome = plugin.optimizer_step(&handle, &mut optimizer, 0, &loss).unwrap();

        assert_eq!(outcome, StepOutcome::SkippedOverflow);
        assert_eq!(optimizer.steps(), 0);
        assert!(!plugin.found_inf());
        assert_eq!(plugin.scaler().unwrap().scale(), 512.0);
        assert_eq!(plugin.scaler().unwrap().overflow_count(), 1);
    }

    #[test]
    fn test_skipped_backward_leaves_scaler_alone() {
        let mut plugin = MixedPrecision::new(Precision::Fp16).unwrap();
        let model = InstrumentedModel::new(&[1]);
        let mut optimizer = RecordingOptimizer::new(vec![model.params().to_vec()], model.log());
        let handle = ModelHandle::Bare(&model);

        let outcome = plugin
            .optimizer_step(&handle, &mut optimizer, 0, &ClosureResult::Skipped)
            .unwrap();

        assert_eq!(outcome, StepOutcome::SkippedBackward);
        assert_eq!(plugin.scaler().unwrap().successful_steps(), 0);
        assert!(!model.events().contains(&Event::OptimizerStep(0)));
    }

    #[test]
    fn test_forward_context_enables_and_restores_autocast() {
        let plugin = MixedPrecision::new(Precision::Bf16).unwrap();
        let scope = Rc::clone(plugin.core().scope());
        assert_eq!(scope.autocast(), None);

        {
            let _train = plugin.train_step_context();
            assert_eq!(scope.autocast(), Some(Precision::Bf16));
            assert_eq!(scope.phases(), vec![ExecutionPhase::Forward, ExecutionPhase::Train]);
            assert_eq!(scope.autocast_value(1.0 + 1.0 / 512.0), 1.0);
        }

        assert_eq!(scope.autocast(), None);
        assert_eq!(scope.depth(), 0);
    }

    #[test]
    fn test_checkpoint_round_trip_of_scaler_state() {
        let mut saved = MixedPrecision::new(Precision::Fp16).unwrap();
        saved.scaler.as_mut().unwrap().update(true);
        let mut checkpoint = Checkpoint::new();
        saved.on_save_checkpoint(&mut checkpoint).unwrap();
        assert!(checkpoint.contains_key(SCALER_STATE_KEY));

        let mut restored = MixedPrecision::new(Precision::Fp16).unwrap();
        restored.on_load_checkpoint(&checkpoint).unwrap();
        assert_eq!(restored.scaler(), saved.scaler());
    }

    #[test]
    fn test_bf16_checkpoint_is_empty() {
        let plugin = MixedPrecision::new(Precision::Bf16).unwrap();
        let mut checkpoint = Checkpoint::new();
        plugin.on_save_checkpoint(&mut checkpoint).unwrap();
        assert!(checkpoint.is_empty());
    }
}
