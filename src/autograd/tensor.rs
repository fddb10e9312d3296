//! Tensor with gradient tracking
//!
//! Data and gradient live behind shared cells, so clones of a parameter (the
//! copy held by a model and the copy registered in an optimizer's parameter
//! group) observe the same values and the same gradient.

use super::backward::{topo_order, BackwardOp};
use crate::error::{Error, Result};
use ndarray::Array1;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// 1-D tensor participating in the autograd tape
#[derive(Clone)]
pub struct Tensor {
    data: Rc<RefCell<Array1<f32>>>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    backward_op: Option<Rc<dyn BackwardOp>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor from an ndarray
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad,
        }
    }

    /// Create a tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a zero-filled tensor
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Borrow the underlying data
    pub fn data(&self) -> Ref<'_, Array1<f32>> {
        self.data.borrow()
    }

    /// Mutably borrow the underlying data
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        self.data.borrow_mut()
    }

    /// Copy the data out as a vector
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.borrow().to_vec()
    }

    /// First element; the value of a scalar loss
    pub fn item(&self) -> f32 {
        self.data.borrow().first().copied().unwrap_or(0.0)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether gradients flow into this tensor
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Current gradient, if one has been produced
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Whether a gradient is present
    pub fn has_grad(&self) -> bool {
        self.grad.borrow().is_some()
    }

    /// Replace the gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add to the gradient, initializing it if absent
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut cell = self.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing += &grad,
            None => *cell = Some(grad),
        }
    }

    /// Mutate the gradient in place
    ///
    /// Returns `false` without calling `f` when there is no gradient.
    pub fn update_grad<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Array1<f32>),
    {
        match self.grad.borrow_mut().as_mut() {
            Some(grad) => {
                f(grad);
                true
            }
            None => false,
        }
    }

    /// Fill an existing gradient with zeros
    pub fn zero_grad(&self) {
        if let Some(grad) = self.grad.borrow_mut().as_mut() {
            grad.fill(0.0);
        }
    }

    /// Drop the gradient entirely
    pub fn clear_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    pub(crate) fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    pub(crate) fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// Graph node that produced this tensor
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Whether two handles point at the same storage
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Copy of this tensor cut off from the graph
    ///
    /// The copy owns fresh storage, carries no gradient and no backward op,
    /// so the graph behind `self` can be released.
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.data.borrow().clone(), false)
    }

    /// Backpropagate from a scalar tensor, seeding with ones
    pub fn backward(&self) -> Result<()> {
        self.backward_with(None)
    }

    /// Backpropagate with an explicit output gradient
    pub fn backward_with(&self, grad_output: Option<Array1<f32>>) -> Result<()> {
        if !self.requires_grad {
            return Err(Error::Backward(
                "tensor does not require grad and has no backward op".into(),
            ));
        }

        let len = self.len();
        let seed = match grad_output {
            Some(grad) if grad.len() != len => {
                return Err(Error::ShapeMismatch {
                    expected: vec![len],
                    actual: vec![grad.len()],
                });
            }
            Some(grad) => grad,
            None => Array1::ones(len),
        };
        self.set_grad(seed);

        if let Some(root) = &self.backward_op {
            for op in topo_order(root).iter().rev() {
                op.backward();
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("data", &self.data.borrow())
            .field("grad", &self.grad.borrow())
            .field("requires_grad", &self.requires_grad)
            .field("has_backward_op", &self.backward_op.is_some())
            .finish()
    }
}
