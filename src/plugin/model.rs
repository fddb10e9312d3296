//! Model capabilities seen by the precision hooks
//!
//! The hooks either receive a full trainable model, which may override how
//! backward and clipping run, or a bare module that only exposes parameters.
//! [`ModelHandle`] makes that distinction explicit at the call site.

use super::GradientClipper;
use crate::error::Result;
use crate::optim::{ClipSpec, Optimizer};
use crate::Tensor;
use ndarray::Array1;

/// Anything that owns named trainable parameters
pub trait Module {
    /// Parameters paired with their names, in registration order
    fn named_parameters(&self) -> Vec<(String, Tensor)>;

    /// Parameters without names
    fn parameters(&self) -> Vec<Tensor> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }
}

/// Model that participates in the training loop
///
/// Every method has a default, so a model only overrides what it customizes.
pub trait TrainableModule: Module {
    /// Whether the loop owns backward and stepping
    ///
    /// Manual optimization (`false`) lets the model decide per batch whether
    /// backward runs at all.
    fn automatic_optimization(&self) -> bool {
        true
    }

    /// Produce gradients for `loss`
    fn backward(
        &mut self,
        loss: &Tensor,
        optimizer: Option<&mut dyn Optimizer>,
        args: &BackwardArgs,
    ) -> Result<()> {
        let _ = optimizer;
        loss.backward_with(args.grad_output.clone())
    }

    /// Clip gradients of `optimizer`'s parameters
    ///
    /// The default applies `clip` through the strategy's clipper; override to
    /// change thresholds per optimizer or skip clipping.
    fn configure_gradient_clipping(
        &mut self,
        optimizer: &dyn Optimizer,
        optimizer_idx: usize,
        clip: &ClipSpec,
        clipper: &dyn GradientClipper,
    ) {
        let _ = optimizer_idx;
        clipper.apply_clip(optimizer, clip);
    }

    /// Called before backward with the loss about to be differentiated
    fn on_before_backward(&mut self, _loss: &Tensor) {}

    /// Called after backward
    fn on_after_backward(&mut self) {}

    /// Called after clipping, right before the optimizer runs
    fn on_before_optimizer_step(&mut self, _optimizer: &dyn Optimizer, _optimizer_idx: usize) {}
}

/// Model passed to the hooks
pub enum ModelHandle<'a> {
    /// Full model with its own backward and clipping overrides
    Full(&'a mut dyn TrainableModule),
    /// Plain module, used when running without the training loop's model
    Bare(&'a dyn Module),
}

impl ModelHandle<'_> {
    /// The full model, if this handle carries one
    pub fn trainable_mut(&mut self) -> Option<&mut dyn TrainableModule> {
        match self {
            ModelHandle::Full(model) => {
                let model: &mut dyn TrainableModule = &mut **model;
                Some(model)
            }
            ModelHandle::Bare(_) => None,
        }
    }

    /// Whether this handle carries a full model
    pub fn is_full(&self) -> bool {
        matches!(self, ModelHandle::Full(_))
    }

    /// Named parameters of the underlying module
    pub fn named_parameters(&self) -> Vec<(String, Tensor)> {
        match self {
            ModelHandle::Full(model) => model.named_parameters(),
            ModelHandle::Bare(module) => module.named_parameters(),
        }
    }

    /// Automatic optimization flag; bare modules always count as automatic
    pub fn automatic_optimization(&self) -> bool {
        match self {
            ModelHandle::Full(model) => model.automatic_optimization(),
            ModelHandle::Bare(_) => true,
        }
    }
}

impl std::fmt::Debug for ModelHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelHandle::Full(_) => f.write_str("ModelHandle::Full"),
            ModelHandle::Bare(_) => f.write_str("ModelHandle::Bare"),
        }
    }
}

/// Extra arguments forwarded to backward
#[derive(Debug, Clone, Default)]
pub struct BackwardArgs {
    /// Seed gradient; ones when absent
    pub grad_output: Option<Array1<f32>>,
}

impl BackwardArgs {
    /// Backward seeded with `grad_output`
    pub fn with_grad_output(grad_output: Array1<f32>) -> Self {
        Self {
            grad_output: Some(grad_output),
        }
    }
}

/// Outcome of one forward + backward closure
#[derive(Debug, Clone)]
pub enum ClosureResult {
    /// Backward ran on this loss
    Loss(Tensor),
    /// Backward did not run
    Skipped,
}

impl ClosureResult {
    /// Wrap an optional loss
    pub fn from_option(loss: Option<Tensor>) -> Self {
        match loss {
            Some(loss) => ClosureResult::Loss(loss),
            None => ClosureResult::Skipped,
        }
    }

    /// Whether backward was skipped
    pub fn is_skipped(&self) -> bool {
        matches!(self, ClosureResult::Skipped)
    }

    /// Loss, if backward ran
    pub fn loss(&self) -> Option<&Tensor> {
        match self {
            ClosureResult::Loss(loss) => Some(loss),
            ClosureResult::Skipped => None,
        }
    }
}

/// What the optimizer step coordinator did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The optimizer stepped
    Stepped,
    /// Automatic optimization with no backward: nothing to step
    SkippedBackward,
    /// Non-finite gradients after unscaling
    SkippedOverflow,
}

impl StepOutcome {
    /// Whether the optimizer's step ran
    pub fn stepped(&self) -> bool {
        matches!(self, StepOutcome::Stepped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Linear {
        weight: Tensor,
        bias: Tensor,
    }

    impl Module for Linear {
        fn named_parameters(&self) -> Vec<(String, Tensor)> {
            vec![
                ("weight".to_string(), self.weight.clone()),
                ("bias".to_string(), self.bias.clone()),
            ]
        }
    }

    struct Manual(Linear);

    impl Module for Manual {
        fn named_parameters(&self) -> Vec<(String, Tensor)> {
            self.0.named_parameters()
        }
    }

    impl TrainableModule for Manual {
        fn automatic_optimization(&self) -> bool {
            false
        }
    }

    fn linear() -> Linear {
        Linear {
            weight: Tensor::from_vec(vec![1.0, 2.0], true),
            bias: Tensor::from_vec(vec![0.5], true),
        }
    }

    #[test]
    fn test_parameters_follow_registration_order() {
        let model = linear();
        let params = model.parameters();
        assert_eq!(params.len(), 2);
        assert!(params[0].shares_storage(&model.weight));
        assert!(params[1].shares_storage(&model.bias));
    }

    #[test]
    fn test_handle_variants() {
        let bare = linear();
        let handle = ModelHandle::Bare(&bare);
        assert!(!handle.is_full());
        assert!(handle.automatic_optimization());
        assert_eq!(handle.named_parameters()[0].0, "weight");

        let mut manual = Manual(linear());
        let mut handle = ModelHandle::Full(&mut manual);
        assert!(handle.is_full());
        assert!(!handle.automatic_optimization());
        assert!(handle.trainable_mut().is_some());
    }

    #[test]
    fn test_default_backward_seeds_gradients() {
        let mut model = Manual(linear());
        let loss = crate::autograd::sum(&model.0.weight);

        model.backward(&loss, None, &BackwardArgs::default()).unwrap();

        assert_eq!(model.0.weight.grad().unwrap().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_closure_result() {
        let loss = Tensor::from_vec(vec![0.25], false);
        let result = ClosureResult::from_option(Some(loss));
        assert!(!result.is_skipped());
        assert_eq!(result.loss().unwrap().item(), 0.25);

        let skipped = ClosureResult::from_option(None);
        assert!(skipped.is_skipped());
        assert!(skipped.loss().is_none());
    }

    #[test]
    fn test_step_outcome() {
        assert!(StepOutcome::Stepped.stepped());
        assert!(!StepOutcome::SkippedBackward.stepped());
        assert!(!StepOutcome::SkippedOverflow.stepped());
    }
}
