//! Declarative precision configuration
//!
//! A [`PrecisionSpec`] is read from YAML, validated, and turned into the run
//! settings and precision strategy the training loop uses.

mod builder;
mod loader;
mod schema;
mod validate;


pub use builder::build_plugin;
pub use loader::load_spec;
pub use schema::{PrecisionSpec, ScalerSpec};
pub use validate::{validate_spec, ValidationError};
