//! Optimizer trait

use super::{ParamGroup, ParamView};
use crate::error::Result;

/// Trait for optimization algorithms
///
/// An optimizer owns its parameter groups; everything else in the step
/// pipeline only reads them through [`ParamView`].
pub trait Optimizer {
    /// Parameter groups in registration order
    fn param_groups(&self) -> &[ParamGroup];

    /// Mutable access to the parameter groups
    fn param_groups_mut(&mut self) -> &mut Vec<ParamGroup>;

    /// Perform a single optimization step
    fn step(&mut self) -> Result<()>;

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Name for logging
    fn name(&self) -> &'static str {
        "Optimizer"
    }

    /// Register another parameter group
    fn add_param_group(&mut self, group: ParamGroup) {
        self.param_groups_mut().push(group);
    }

    /// Zero out all gradients
    fn zero_grad(&mut self) {
        for param in ParamView::new(self.param_groups()) {
            param.zero_grad();
        }
    }
}

/// All parameters of an optimizer, flattened in group order
pub fn params(optimizer: &dyn Optimizer) -> ParamView<'_> {
    ParamView::new(optimizer.param_groups())
}
