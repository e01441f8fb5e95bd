// src/config/mod.rs

//! Rule-definition loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a definition from disk (`loader.rs`).
//! - Validate it into a [`WorkflowDefinition`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_fs, load_from_path, parse_str};
pub use model::{
    BackoffConfig, ConfigSection, ParamDecl, RawWorkflowFile, RuleConfig, TransferConfig,
    WildcardSource, WorkflowDefinition,
};
