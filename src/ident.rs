// src/ident.rs

//! Deterministic, collision-checked parameter identifiers.
//!
//! Identifiers are built from `[A-Za-z0-9_]` only and carry a prefix telling
//! where they came from:
//!
//! - `a_` absolute file path
//! - `r_` relative file path
//! - `p_` declared workflow parameter
//!
//! The path encoding is injective (`_` itself is escaped), so distinct paths
//! only meet if an overlong identifier is shortened to a hashed suffix. The
//! resolver keeps a reverse map and refuses to hand out one identifier for two
//! different sources.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::CompileError;
use crate::rules::FileHandle;

/// Identifiers longer than this are truncated and suffixed with a digest.
pub const MAX_IDENTIFIER_LEN: usize = 96;

/// Characters of the digest kept in a shortened identifier.
const DIGEST_CHARS: usize = 16;

/// A valid parameter name in the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterIdentifier(String);

impl ParameterIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParameterIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParameterIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Memoizing resolver scoped to a single compilation.
#[derive(Debug, Default)]
pub struct IdentifierResolver {
    files: HashMap<FileHandle, ParameterIdentifier>,
    params: HashMap<String, ParameterIdentifier>,
    /// identifier -> description of the source that claimed it
    owners: HashMap<ParameterIdentifier, String>,
}

impl IdentifierResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of a file handle. Idempotent within this resolver.
    pub fn resolve(&mut self, handle: &FileHandle) -> Result<ParameterIdentifier, CompileError> {
        if let Some(id) = self.files.get(handle) {
            return Ok(id.clone());
        }

        let (prefix, body) = match handle.as_str().strip_prefix('/') {
            Some(rest) => ("a_", rest),
            None => ("r_", handle.as_str()),
        };
        let id = self.claim(shorten(prefix, &encode(body)), handle.as_str().to_string())?;
        trace!(path = %handle, identifier = %id, "resolved identifier");
        self.files.insert(handle.clone(), id.clone());
        Ok(id)
    }

    /// Identifier of a declared workflow parameter.
    pub fn resolve_param(&mut self, name: &str) -> Result<ParameterIdentifier, CompileError> {
        if let Some(id) = self.params.get(name) {
            return Ok(id.clone());
        }
        let id = self.claim(shorten("p_", &encode(name)), format!("parameter {name}"))?;
        self.params.insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Number of distinct identifiers handed out so far.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    fn claim(&mut self, raw: String, source: String) -> Result<ParameterIdentifier, CompileError> {
        let id = ParameterIdentifier(raw);
        match self.owners.get(&id) {
            Some(existing) if *existing != source => Err(CompileError::IdentifierCollision {
                identifier: id.0,
                first: existing.clone(),
                second: source,
            }),
            Some(_) => Ok(id),
            None => {
                self.owners.insert(id.clone(), source);
                Ok(id)
            }
        }
    }
}

/// Escape a string into `[A-Za-z0-9_]`.
///
/// `_` -> `__`, `/` -> `_s`, `.` -> `_d`, `-` -> `_h`, anything else
/// non-alphanumeric -> `_u<hex>_`.
pub fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' => out.push_str("__"),
            '/' => out.push_str("_s"),
            '.' => out.push_str("_d"),
            '-' => out.push_str("_h"),
            other => {
                let _ = write!(out, "_u{:x}_", other as u32);
            }
        }
    }
    out
}

fn shorten(prefix: &str, encoded: &str) -> String {
    let full = format!("{prefix}{encoded}");
    if full.len() <= MAX_IDENTIFIER_LEN {
        return full;
    }
    let digest = blake3::hash(full.as_bytes()).to_hex();
    let keep = MAX_IDENTIFIER_LEN - DIGEST_CHARS - 2;
    format!("{}_x{}", &full[..keep], &digest.as_str()[..DIGEST_CHARS])
}
