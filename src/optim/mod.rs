//! Optimizers, parameter views, gradient clipping and norm statistics

mod clip;
mod grad_norm;
mod optimizer;
mod param_group;
mod sgd;
mod view;

pub use clip::{clip_grad_norm, clip_grad_value, total_grad_norm, ClipSpec, GradClipAlgorithm};
pub use grad_norm::{grad_norm, GradNormDict, NormType, DISABLED_NORM};
pub use optimizer::{params, Optimizer};
pub use param_group::ParamGroup;
pub use sgd::SGD;
pub use view::ParamView;
