//! Differentiable operations

mod basic;
mod loss;
mod node;

pub use basic::{add, cast, mul, scale, sum};
pub use loss::mse;
