//! Precision levels and loss scaling
//!
//! Mixed-precision training runs activations and gradients at fp16 or bf16
//! while keeping fp32 master weights. For fp16 the [`GradScaler`] multiplies
//! the loss before backward so small gradients do not underflow, then divides
//! the gradients back before the optimizer consumes them.

mod config;
mod precision_types;
mod scaler;


pub use config::{MixedPrecisionConfig, DEFAULT_GROWTH_INTERVAL, DEFAULT_INITIAL_SCALE};
pub use precision_types::Precision;
pub use scaler::GradScaler;
