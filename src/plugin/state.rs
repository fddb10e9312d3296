//! State shared by every precision strategy

use super::hooks::{HookRegistry, StepHook};
use super::model::ModelHandle;
use super::scope::ExecutionScope;
use crate::optim::Optimizer;
use crate::Tensor;
use std::fmt;
use std::rc::Rc;

/// Predicate telling whether the active backend clips gradients itself
pub type BackendPredicate = Box<dyn Fn() -> bool>;

/// Listeners, scope state and the clip bypass of one strategy instance
#[derive(Default)]
pub struct PluginCore {
    hooks: HookRegistry,
    scope: Rc<ExecutionScope>,
    clip_bypass: Option<BackendPredicate>,
}

impl PluginCore {
    /// Core with no listeners and no bypass
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step listener
    pub fn add_hook<H: StepHook + 'static>(&mut self, hook: H) {
        self.hooks.add(hook);
    }

    /// Registered listeners
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Shared scope state
    pub fn scope(&self) -> &Rc<ExecutionScope> {
        &self.scope
    }

    /// Skip clipping whenever `predicate` holds
    pub fn set_clip_bypass<F>(&mut self, predicate: F)
    where
        F: Fn() -> bool + 'static,
    {
        self.clip_bypass = Some(Box::new(predicate));
    }

    /// Whether the backend currently owns clipping
    pub fn backend_clips(&self) -> bool {
        self.clip_bypass.as_ref().is_some_and(|predicate| predicate())
    }

    /// Fire before-backward on listeners, then on the model
    pub fn notify_before_backward(&mut self, model: &mut ModelHandle<'_>, loss: &Tensor) {
        self.hooks.on_before_backward(loss);
        if let Some(model) = model.trainable_mut() {
            model.on_before_backward(loss);
        }
    }

    /// Fire after-backward on listeners, then on the model
    pub fn notify_after_backward(&mut self, model: &mut ModelHandle<'_>) {
        self.hooks.on_after_backward();
        if let Some(model) = model.trainable_mut() {
            model.on_after_backward();
        }
    }

    /// Fire before-optimizer-step on listeners, then on the model
    pub fn notify_before_optimizer_step(
        &mut self,
        model: &mut ModelHandle<'_>,
        optimizer: &dyn Optimizer,
        optimizer_idx: usize,
    ) {
        self.hooks.on_before_optimizer_step(optimizer, optimizer_idx);
        if let Some(model) = model.trainable_mut() {
            model.on_before_optimizer_step(optimizer, optimizer_idx);
        }
    }
}

impl fmt::Debug for PluginCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCore")
            .field("hooks", &self.hooks)
            .field("scope", &self.scope)
            .field("clip_bypass", &self.clip_bypass.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_clip_bypass_is_evaluated_lazily() {
        let mut core = PluginCore::new();
        assert!(!core.backend_clips());

        let active = Rc::new(Cell::new(false));
        let flag = Rc::clone(&active);
        core.set_clip_bypass(move || flag.get());

        assert!(!core.backend_clips());
        active.set(true);
        assert!(core.backend_clips());
    }

    #[test]
    fn test_add_hook_registers_listener() {
        struct Named;
        impl StepHook for Named {
            fn name(&self) -> &'static str {
                "named"
            }
        }

        let mut core = PluginCore::new();
        core.add_hook(Named);
        assert_eq!(core.hooks().names(), vec!["named"]);
    }
}
