//! Stochastic Gradient Descent optimizer

use super::{Optimizer, ParamGroup};
use crate::error::Result;
use ndarray::Array1;

/// SGD optimizer with optional momentum
pub struct SGD {
    groups: Vec<ParamGroup>,
    lr: f32,
    momentum: f32,
    /// One velocity slot per parameter, indexed by group then position
    velocities: Vec<Vec<Option<Array1<f32>>>>,
}

impl SGD {
    /// Create a new SGD optimizer over one parameter group
    pub fn new(params: Vec<crate::Tensor>, lr: f32, momentum: f32) -> Self {
        Self::with_groups(vec![ParamGroup::new(params)], lr, momentum)
    }

    /// Create a new SGD optimizer over several parameter groups
    pub fn with_groups(groups: Vec<ParamGroup>, lr: f32, momentum: f32) -> Self {
        Self {
            groups,
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }

    /// Grow velocity storage to match groups added since the last step
    fn ensure_velocities(&mut self) {
        self.velocities.resize_with(self.groups.len(), Vec::new);
        for (slots, group) in self.velocities.iter_mut().zip(&self.groups) {
            slots.resize_with(group.len(), || None);
        }
    }
}

impl Optimizer for SGD {
    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut Vec<ParamGroup> {
        &mut self.groups
    }

    fn step(&mut self) -> Result<()> {
        self.ensure_velocities();

        for (group, slots) in self.groups.iter().zip(self.velocities.iter_mut()) {
            let lr = group.lr.unwrap_or(self.lr);

            for (param, velocity) in group.params().iter().zip(slots.iter_mut()) {
                let Some(mut grad) = param.grad() else {
                    continue;
                };
                if group.weight_decay != 0.0 {
                    grad = grad + &*param.data() * group.weight_decay;
                }

                if self.momentum > 0.0 {
                    // v = momentum * v - lr * grad
                    let next = match velocity.take() {
                        Some(v) => v * self.momentum - &grad * lr,
                        None => &grad * (-lr),
                    };
                    *param.data_mut() += &next;
                    *velocity = Some(next);
                } else {
                    *param.data_mut() -= &(&grad * lr);
                }
            }
        }

        Ok(())
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &'static str {
        "SGD"
    }
}
