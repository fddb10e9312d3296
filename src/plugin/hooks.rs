//! Explicit callback registry and gradient-norm sinks
//!
//! Precision strategies notify the orchestrator through listeners that are
//! registered up front, never through a global lookup.

use crate::optim::{GradNormDict, Optimizer};
use crate::Tensor;
use tracing::info;

/// Hook name under which gradient norms are reported
pub const BEFORE_OPTIMIZER_STEP: &str = "on_before_optimizer_step";

/// Listener for per-step events
///
/// All methods default to no-ops; implement only the events you need.
pub trait StepHook {
    /// Called before backward with the (possibly rescaled) loss
    fn on_before_backward(&mut self, _loss: &Tensor) {}

    /// Called after backward once the loss has been detached
    fn on_after_backward(&mut self) {}

    /// Called after clipping, right before the optimizer runs
    fn on_before_optimizer_step(&mut self, _optimizer: &dyn Optimizer, _optimizer_idx: usize) {}

    /// Get hook name for logging
    fn name(&self) -> &'static str {
        "StepHook"
    }
}

/// Ordered list of step listeners
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn StepHook>>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; listeners fire in registration order
    pub fn add<H: StepHook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Check if no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Get number of listeners
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Names of the registered listeners
    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Fire before-backward
    pub fn on_before_backward(&mut self, loss: &Tensor) {
        for hook in &mut self.hooks {
            hook.on_before_backward(loss);
        }
    }

    /// Fire after-backward
    pub fn on_after_backward(&mut self) {
        for hook in &mut self.hooks {
            hook.on_after_backward();
        }
    }

    /// Fire before-optimizer-step
    pub fn on_before_optimizer_step(&mut self, optimizer: &dyn Optimizer, optimizer_idx: usize) {
        for hook in &mut self.hooks {
            hook.on_before_optimizer_step(optimizer, optimizer_idx);
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.names()).finish()
    }
}

/// Destination for gradient-norm statistics
pub trait GradNormSink {
    /// Record one dictionary of norms produced inside hook `fx_name`
    fn log_grad_norm(&mut self, fx_name: &str, norms: &GradNormDict);
}

/// Sink that keeps every report in memory
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    reports: Vec<(String, GradNormDict)>,
}

impl InMemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports in arrival order
    pub fn reports(&self) -> &[(String, GradNormDict)] {
        &self.reports
    }

    /// Most recent report
    pub fn last(&self) -> Option<&GradNormDict> {
        self.reports.last().map(|(_, norms)| norms)
    }

    /// Number of reports received
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether nothing was reported
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl GradNormSink for InMemorySink {
    fn log_grad_norm(&mut self, fx_name: &str, norms: &GradNormDict) {
        self.reports.push((fx_name.to_string(), norms.clone()));
    }
}

/// Sink that emits one `tracing` event per norm
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl GradNormSink for TracingSink {
    fn log_grad_norm(&mut self, fx_name: &str, norms: &GradNormDict) {
        for (key, value) in norms {
            info!(target: "entrenar_precision::grad_norm", fx = fx_name, key = %key, value, "grad norm");
        }
    }
}
