//! Graph nodes and the order they run in

use super::Tensor;
use std::collections::HashSet;
use std::rc::Rc;

/// A node in the computational graph that pushes the gradient of its output
/// into its inputs' gradient cells.
pub trait BackwardOp {
    /// Tensors this node was computed from
    fn inputs(&self) -> &[Tensor];

    /// Accumulate the output gradient into the inputs
    ///
    /// Must not recurse; the tensor running backward orders the nodes.
    fn backward(&self);
}

fn node_id(op: &Rc<dyn BackwardOp>) -> usize {
    Rc::as_ptr(op) as *const () as usize
}

/// Every node reachable from `root`, inputs before the nodes that use them
///
/// Running the result in reverse visits each node once, after all of its
/// consumers have contributed to its output gradient.
pub(crate) fn topo_order(root: &Rc<dyn BackwardOp>) -> Vec<Rc<dyn BackwardOp>> {
    fn visit(
        op: &Rc<dyn BackwardOp>,
        visited: &mut HashSet<usize>,
        order: &mut Vec<Rc<dyn BackwardOp>>,
    ) {
        if !visited.insert(node_id(op)) {
            return;
        }
        for input in op.inputs() {
            if let Some(child) = input.backward_op() {
                visit(&child, visited, order);
            }
        }
        order.push(Rc::clone(op));
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(root, &mut visited, &mut order);
    order
}
