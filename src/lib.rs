//! Entrenar precision hooks
//!
//! Per-step precision strategies for entrenar training loops: how backward
//! and the optimizer step run numerically, gradient clipping and gradient
//! norm tracking before the optimizer consumes gradients, and scoped
//! contexts around forward computation.
//!
//! # Usage
//!
//! ```
//! use entrenar_precision::autograd::{mse, Precision};
//! use entrenar_precision::optim::{ClipSpec, SGD};
//! use entrenar_precision::plugin::{build_plugin, InMemorySink, ModelHandle, Module, RunSettings};
//! use entrenar_precision::step::run_optimization_step;
//! use entrenar_precision::Tensor;
//!
//! struct Bias(Tensor);
//!
//! impl Module for Bias {
//!     fn named_parameters(&self) -> Vec<(String, Tensor)> {
//!         vec![("bias".to_string(), self.0.clone())]
//!     }
//! }
//!
//! let model = Bias(Tensor::from_vec(vec![0.0, 0.0], true));
//! let mut optimizer = SGD::new(model.parameters(), 0.1, 0.0);
//! let mut plugin = build_plugin(Precision::Fp32, None);
//! let settings = RunSettings::with_clip(ClipSpec::norm(1.0));
//! let mut sink = InMemorySink::new();
//! let target = Tensor::from_vec(vec![1.0, -1.0], false);
//!
//! let mut handle = ModelHandle::Bare(&model);
//! let report = run_optimization_step(
//!     plugin.as_mut(),
//!     &mut handle,
//!     &mut optimizer,
//!     0,
//!     &settings,
//!     &mut sink,
//!     |m| Ok(Some(mse(&m.named_parameters()[0].1, &target))),
//! )
//! .unwrap();
//!
//! assert!(report.outcome.stepped());
//! ```

pub mod autograd;
pub mod config;
pub mod error;
pub mod optim;
pub mod plugin;
pub mod step;

pub use autograd::Tensor;
pub use error::{Error, Result};
