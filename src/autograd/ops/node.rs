//! The one graph node every op records

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Maps the gradient of an op's output to one gradient per input
type LocalGrad = Box<dyn Fn(&Array1<f32>) -> Vec<Array1<f32>>>;

struct Node {
    inputs: Vec<Tensor>,
    local: LocalGrad,
    output_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for Node {
    fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    fn backward(&self) {
        let Some(grad) = self.output_grad.borrow().clone() else {
            return;
        };
        for (input, input_grad) in self.inputs.iter().zip((self.local)(&grad)) {
            if input.requires_grad() {
                input.accumulate_grad(input_grad);
            }
        }
    }
}

/// Tensor holding `data`, wired back to `inputs` through `local`
///
/// No node is recorded when none of the inputs requires grad.
pub(super) fn record<F>(data: Array1<f32>, inputs: &[&Tensor], local: F) -> Tensor
where
    F: Fn(&Array1<f32>) -> Vec<Array1<f32>> + 'static,
{
    let requires_grad = inputs.iter().any(|t| t.requires_grad());
    let mut out = Tensor::new(data, requires_grad);
    if requires_grad {
        out.set_backward_op(Rc::new(Node {
            inputs: inputs.iter().map(|&t| t.clone()).collect(),
            local: Box::new(local),
            output_grad: out.grad_cell(),
        }));
    }
    out
}
