//! Scoped execution contexts
//!
//! A [`ScopeGuard`] marks a computation phase as active for as long as it is
//! alive. Dropping the guard runs its teardown actions and pops the phase, on
//! every exit path: normal return, `?` early return, or unwinding panic.
//! Phase-specific guards wrap a generic forward guard, so the phase is torn
//! down before the forward state it sits on.

use crate::autograd::{self, Precision};
use crate::Tensor;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Computation phase bracketed by a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPhase {
    /// Generic model forward
    Forward,
    /// Training step
    Train,
    /// Validation step
    Validate,
    /// Test step
    Test,
    /// Prediction step
    Predict,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionPhase::Forward => "forward",
            ExecutionPhase::Train => "train",
            ExecutionPhase::Validate => "validate",
            ExecutionPhase::Test => "test",
            ExecutionPhase::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// Ambient state shared by all scopes of one precision strategy
///
/// Holds the stack of active phases and the autocast precision in effect.
#[derive(Debug, Default)]
pub struct ExecutionScope {
    phases: RefCell<Vec<ExecutionPhase>>,
    autocast: Cell<Option<Precision>>,
}

impl ExecutionScope {
    /// Fresh shared scope state
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Innermost active phase
    pub fn current_phase(&self) -> Option<ExecutionPhase> {
        self.phases.borrow().last().copied()
    }

    /// Active phases, outermost first
    pub fn phases(&self) -> Vec<ExecutionPhase> {
        self.phases.borrow().clone()
    }

    /// Number of active phases
    pub fn depth(&self) -> usize {
        self.phases.borrow().len()
    }

    /// Whether `phase` is active anywhere in the stack
    pub fn is_active(&self, phase: ExecutionPhase) -> bool {
        self.phases.borrow().contains(&phase)
    }

    /// Autocast precision in effect, if any
    pub fn autocast(&self) -> Option<Precision> {
        self.autocast.get()
    }

    /// Replace the autocast precision, returning the previous one
    pub fn set_autocast(&self, precision: Option<Precision>) -> Option<Precision> {
        self.autocast.replace(precision)
    }

    /// Round a value through the active autocast precision
    pub fn autocast_value(&self, value: f32) -> f32 {
        match self.autocast.get() {
            Some(precision) => precision.round(value),
            None => value,
        }
    }

    /// Cast a tensor to the active autocast precision
    ///
    /// Gradients pass straight through the cast. Without autocast the
    /// tensor is returned as is.
    pub fn autocast_tensor(&self, tensor: &Tensor) -> Tensor {
        match self.autocast.get() {
            Some(precision) if precision.is_reduced() => autograd::cast(tensor, precision),
            _ => tensor.clone(),
        }
    }

    fn push(&self, phase: ExecutionPhase) -> usize {
        let mut phases = self.phases.borrow_mut();
        let depth = phases.len();
        phases.push(phase);
        depth
    }

    fn truncate(&self, depth: usize) {
        self.phases.borrow_mut().truncate(depth);
    }
}

/// RAII handle for an entered scope
#[must_use = "the scope exits as soon as the guard is dropped"]
pub struct ScopeGuard {
    scope: Rc<ExecutionScope>,
    phase: ExecutionPhase,
    depth: usize,
    teardown: Vec<Box<dyn FnOnce()>>,
    // dropped after this guard's own teardown
    inner: Option<Box<ScopeGuard>>,
}

impl ScopeGuard {
    /// Enter `phase` on `scope`
    pub fn enter(scope: &Rc<ExecutionScope>, phase: ExecutionPhase) -> Self {
        let depth = scope.push(phase);
        trace!(%phase, depth, "enter scope");
        Self {
            scope: Rc::clone(scope),
            phase,
            depth,
            teardown: Vec::new(),
            inner: None,
        }
    }

    /// Enter `phase` on top of this guard
    ///
    /// The returned guard owns `self`; on drop the new phase exits first,
    /// then this one.
    pub fn nest(self, phase: ExecutionPhase) -> Self {
        let scope = Rc::clone(&self.scope);
        let mut outer = Self::enter(&scope, phase);
        outer.inner = Some(Box::new(self));
        outer
    }

    /// Register an action to run when the scope exits
    ///
    /// Actions run in reverse registration order.
    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.teardown.push(Box::new(teardown));
        self
    }

    /// Phase entered by this guard
    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Shared scope state
    pub fn scope(&self) -> &Rc<ExecutionScope> {
        &self.scope
    }

    /// Run `body` inside the scope, exiting it afterwards
    pub fn run<R, F>(self, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self;
        body()
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("phase", &self.phase)
            .field("depth", &self.depth)
            .field("teardown", &self.teardown.len())
            .field("inner", &self.inner)
            .finish()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        while let Some(teardown) = self.teardown.pop() {
            teardown();
        }
        self.scope.truncate(self.depth);
        trace!(phase = %self.phase, depth = self.depth, "exit scope");
    }
}
