// src/entrypoint/mod.rs

//! Per-node entrypoints.
//!
//! [`generate`] turns a compiled graph into typed [`ExecutableDescription`]s;
//! [`render`] turns those into scripts. The only side effect of this module
//! is producing text.

pub mod description;
pub mod generate;
pub mod render;

pub use description::{ExecutableDescription, MaterializeStep, PublishDestination, PublishStep};
pub use generate::generate;
pub use render::{render_script, shell_quote};
