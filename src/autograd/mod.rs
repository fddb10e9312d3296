//! Tape-based autograd engine
//!
//! Provides the tensors, gradient cells and backward operations that the
//! precision hooks read and mutate: parameters carry shared gradients, losses
//! carry a backward op, and mixed precision scales losses before backward.

mod backward;
mod ops;
pub mod precision;
mod tensor;

pub use backward::BackwardOp;
pub use ops::*;
pub use precision::{GradScaler, MixedPrecisionConfig, Precision};
pub use tensor::Tensor;
