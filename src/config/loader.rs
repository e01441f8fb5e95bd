// src/config/loader.rs

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::model::{RawWorkflowFile, WorkflowDefinition};
use crate::fs::{FileSystem, RealFileSystem};

/// Load a rule-definition file and return the raw `RawWorkflowFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for a
/// checked [`WorkflowDefinition`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    load_from_fs(&RealFileSystem, path)
}

/// Same as [`load_from_path`], reading through the given filesystem.
pub fn load_from_fs(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    let contents = fs
        .read_to_string(path)
        .with_context(|| format!("reading workflow file at {:?}", path))?;

    let raw: RawWorkflowFile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML workflow from {:?}", path))?;

    Ok(raw)
}

/// Load and validate a rule-definition file.
///
/// This is the entry point for the rest of the application: the returned
/// definition is the explicit configuration object handed to the extractor,
/// compiler, generator and JIT controller.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    WorkflowDefinition::try_from(raw).with_context(|| format!("validating {:?}", path))
}

/// Parse and validate an in-memory definition.
pub fn parse_str(contents: &str) -> Result<WorkflowDefinition> {
    let raw: RawWorkflowFile = toml::from_str(contents).context("parsing TOML workflow")?;
    WorkflowDefinition::try_from(raw)
}
