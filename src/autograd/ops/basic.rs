//! Elementwise arithmetic, reduction and precision casts

use super::node::record;
use crate::autograd::{Precision, Tensor};
use ndarray::Array1;

/// Elementwise sum
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let out = &*a.data() + &*b.data();
    record(out, &[a, b], |g| vec![g.clone(), g.clone()])
}

/// Elementwise product
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    let out = &*a.data() * &*b.data();
    let (lhs, rhs) = (a.clone(), b.clone());
    record(out, &[a, b], move |g| vec![g * &*rhs.data(), g * &*lhs.data()])
}

/// Every element times `factor`
///
/// This is how a loss gets multiplied by the loss scale without leaving the
/// graph.
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let out = &*a.data() * factor;
    record(out, &[a], move |g| vec![g * factor])
}

/// Reduce to a one-element tensor
pub fn sum(a: &Tensor) -> Tensor {
    let out = Array1::from(vec![a.data().sum()]);
    let len = a.len();
    record(out, &[a], move |g| vec![Array1::from_elem(len, g[0])])
}

/// Round values through `precision`
///
/// Backward is straight-through: the full-precision input receives the
/// output gradient unchanged.
pub fn cast(a: &Tensor, precision: Precision) -> Tensor {
    let out = a.data().mapv(|v| precision.round(v));
    record(out, &[a], |g| vec![g.clone()])
}
