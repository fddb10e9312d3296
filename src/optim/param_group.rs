//! Parameter groups owned by optimizers

use crate::Tensor;

/// Ordered collection of trainable tensors with per-group hyperparameters
#[derive(Debug, Clone, Default)]
pub struct ParamGroup {
    params: Vec<Tensor>,
    /// Learning rate override; falls back to the optimizer's rate
    pub lr: Option<f32>,
    /// L2 penalty added to the gradient before the update
    pub weight_decay: f32,
}

impl ParamGroup {
    /// Create a group from parameters in registration order
    pub fn new(params: Vec<Tensor>) -> Self {
        Self {
            params,
            lr: None,
            weight_decay: 0.0,
        }
    }

    /// Set a group-specific learning rate
    pub fn with_lr(mut self, lr: f32) -> Self {
        self.lr = Some(lr);
        self
    }

    /// Set weight decay
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Parameters in registration order
    pub fn params(&self) -> &[Tensor] {
        &self.params
    }

    /// Append a parameter
    pub fn push(&mut self, param: Tensor) {
        self.params.push(param);
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the group is empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
