// src/errors.rs

//! Crate-wide error types.
//!
//! Compile errors are fatal and user-facing: every variant names the rule
//! and/or file path involved so the author can fix the rule definition.

use std::path::PathBuf;

use thiserror::Error;

use crate::jit::{JitError, JitFailure};

#[derive(Error, Debug)]
pub enum RuledagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Jit(#[from] Box<JitFailure>),

    #[error(transparent)]
    Registration(#[from] JitError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of the extract / compile / generate passes.
///
/// None of these are retried; a compilation that hits one never hands a
/// partial graph downstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("cannot resolve wildcards for job {rule}: {detail}")]
    UnresolvedWildcards { rule: String, detail: String },

    #[error("cyclic dependency between jobs: {}", jobs.join(" -> "))]
    Cycle { jobs: Vec<String> },

    #[error("ambiguous producer for {path:?}: produced by {}", producers.join(", "))]
    AmbiguousProducer { path: PathBuf, producers: Vec<String> },

    #[error("dangling input {path:?} of job {rule}: no job produces it and no parameter declares it")]
    DanglingInput { rule: String, path: PathBuf },

    #[error("no producer for target {path:?}")]
    NoProducerForTarget { path: PathBuf },

    #[error("identifier collision: {first:?} and {second:?} both map to '{identifier}'")]
    IdentifierCollision {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("no targets selected and [workflow].targets is empty")]
    NoTargets,

    #[error("unknown rule '{0}' in target selection")]
    UnknownRule(String),

    #[error("invalid pattern '{pattern}' in rule {rule}: {detail}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        detail: String,
    },

    #[error("resolution of {path:?} exceeded depth {depth}; probable wildcard cycle through rule {rule}")]
    ResolutionDepthExceeded {
        rule: String,
        path: PathBuf,
        depth: usize,
    },

    #[error("missing value for parameter '{name}' referenced by {referenced_by}")]
    MissingParameter { name: String, referenced_by: String },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RuledagError>;
