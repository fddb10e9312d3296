//! Instrumented collaborators that record the order of hook calls

use super::{BackwardArgs, GradNormSink, GradientClipper, Module, StepHook, TrainableModule};
use crate::error::Result;
use crate::optim::{ClipSpec, GradNormDict, Optimizer, ParamGroup};
use crate::Tensor;
use std::cell::RefCell;
use std::rc::Rc;

pub(crate) type EventLog = Rc<RefCell<Vec<Event>>>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    BeforeBackward(f32),
    Backward,
    AfterBackward,
    GradNorm,
    Clip(usize),
    BeforeOptimizerStep(usize),
    OptimizerStep(usize),
    Listener(&'static str),
}

/// Model whose parameters are named `layer{i}.weight`
pub(crate) struct InstrumentedModel {
    params: Vec<Tensor>,
    log: EventLog,
    automatic: bool,
}

impl InstrumentedModel {
    pub(crate) fn new(sizes: &[usize]) -> Self {
        Self {
            params: sizes.iter().map(|&n| Tensor::zeros(n, true)).collect(),
            log: Rc::new(RefCell::new(Vec::new())),
            automatic: true,
        }
    }

    pub(crate) fn manual(mut self) -> Self {
        self.automatic = false;
        self
    }

    pub(crate) fn params(&self) -> &[Tensor] {
        &self.params
    }

    pub(crate) fn log(&self) -> EventLog {
        Rc::clone(&self.log)
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }
}

impl Module for InstrumentedModel {
    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        self.params
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("layer{i}.weight"), p.clone()))
            .collect()
    }
}

impl TrainableModule for InstrumentedModel {
    fn automatic_optimization(&self) -> bool {
        self.automatic
    }

    fn backward(
        &mut self,
        loss: &Tensor,
        _optimizer: Option<&mut dyn Optimizer>,
        args: &BackwardArgs,
    ) -> Result<()> {
        self.log.borrow_mut().push(Event::Backward);
        loss.backward_with(args.grad_output.clone())
    }

    fn configure_gradient_clipping(
        &mut self,
        optimizer: &dyn Optimizer,
        optimizer_idx: usize,
        clip: &ClipSpec,
        clipper: &dyn GradientClipper,
    ) {
        self.log.borrow_mut().push(Event::Clip(optimizer_idx));
        clipper.apply_clip(optimizer, clip);
    }

    fn on_before_backward(&mut self, loss: &Tensor) {
        self.log.borrow_mut().push(Event::BeforeBackward(loss.item()));
    }

    fn on_after_backward(&mut self) {
        self.log.borrow_mut().push(Event::AfterBackward);
    }

    fn on_before_optimizer_step(&mut self, _optimizer: &dyn Optimizer, optimizer_idx: usize) {
        self.log.borrow_mut().push(Event::BeforeOptimizerStep(optimizer_idx));
    }
}

/// Optimizer that only counts and records its steps
pub(crate) struct RecordingOptimizer {
    groups: Vec<ParamGroup>,
    lr: f32,
    id: usize,
    steps: usize,
    log: EventLog,
}

impl RecordingOptimizer {
    pub(crate) fn new(groups: Vec<Vec<Tensor>>, log: EventLog) -> Self {
        Self {
            groups: groups.into_iter().map(ParamGroup::new).collect(),
            lr: 0.1,
            id: 0,
            steps: 0,
            log,
        }
    }

    pub(crate) fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps
    }
}

impl Optimizer for RecordingOptimizer {
    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut Vec<ParamGroup> {
        &mut self.groups
    }

    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        self.log.borrow_mut().push(Event::OptimizerStep(self.id));
        Ok(())
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Sink that records a `GradNorm` event and keeps the reports
pub(crate) struct RecordingSink {
    pub(crate) reports: Vec<GradNormDict>,
    log: EventLog,
}

impl RecordingSink {
    pub(crate) fn new(log: EventLog) -> Self {
        Self {
            reports: Vec::new(),
            log,
        }
    }
}

impl GradNormSink for RecordingSink {
    fn log_grad_norm(&mut self, _fx_name: &str, norms: &GradNormDict) {
        self.log.borrow_mut().push(Event::GradNorm);
        self.reports.push(norms.clone());
    }
}

/// Listener that records every callback under its tag
pub(crate) struct RecordingHook {
    log: EventLog,
}

impl RecordingHook {
    pub(crate) fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl StepHook for RecordingHook {
    fn on_before_backward(&mut self, _loss: &Tensor) {
        self.log.borrow_mut().push(Event::Listener("before_backward"));
    }

    fn on_after_backward(&mut self) {
        self.log.borrow_mut().push(Event::Listener("after_backward"));
    }

    fn on_before_optimizer_step(&mut self, _optimizer: &dyn Optimizer, _optimizer_idx: usize) {
        self.log.borrow_mut().push(Event::Listener("before_optimizer_step"));
    }

    fn name(&self) -> &'static str {
        "RecordingHook"
    }
}
