// src/rules/targets.rs

//! Target selection and wildcard expansion.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{WildcardSource, WorkflowDefinition};
use crate::errors::CompileError;
use crate::fs::{FileSystem, list_relative_files};
use crate::rules::handle::{FileHandle, normalize_path};
use crate::rules::pattern::WildcardPattern;
use crate::types::ParamValue;

/// Prefix selecting the inputs of a rule instead of a path.
pub const RULE_TARGET_PREFIX: &str = "rule:";

/// Which files the extractor should build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetSelection {
    /// `[workflow].targets`.
    #[default]
    Default,
    /// Explicit targets; these replace the declared defaults.
    Explicit(Vec<String>),
}

impl TargetSelection {
    pub fn explicit<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TargetSelection::Explicit(targets.into_iter().map(Into::into).collect())
    }

    /// Raw target strings, falling back to the workflow defaults.
    pub fn raw<'a>(&'a self, def: &'a WorkflowDefinition) -> &'a [String] {
        match self {
            TargetSelection::Default => def.default_targets(),
            TargetSelection::Explicit(targets) => targets,
        }
    }
}

/// Expands raw target strings into concrete file handles.
pub(crate) struct TargetExpander<'a> {
    def: &'a WorkflowDefinition,
    fs: &'a dyn FileSystem,
    values: &'a BTreeMap<String, ParamValue>,
}

impl<'a> TargetExpander<'a> {
    pub(crate) fn new(
        def: &'a WorkflowDefinition,
        fs: &'a dyn FileSystem,
        values: &'a BTreeMap<String, ParamValue>,
    ) -> Self {
        Self { def, fs, values }
    }

    /// Expand every target in order. Duplicates are kept; the compiler
    /// collapses them into a single graph output.
    pub(crate) fn expand(&self, raw: &[String]) -> Result<Vec<FileHandle>, CompileError> {
        if raw.is_empty() {
            return Err(CompileError::NoTargets);
        }

        let mut handles = Vec::new();
        for target in raw {
            let target = target.trim();
            if let Some(rule_name) = target.strip_prefix(RULE_TARGET_PREFIX) {
                let rule = self
                    .def
                    .rule(rule_name.trim())
                    .ok_or_else(|| CompileError::UnknownRule(rule_name.trim().to_string()))?;
                for input in rule.inputs() {
                    handles.extend(self.expand_pattern(target, input)?);
                }
            } else {
                let pattern = WildcardPattern::parse(target, &BTreeMap::new()).map_err(|detail| {
                    CompileError::InvalidPattern {
                        rule: "<targets>".to_string(),
                        pattern: target.to_string(),
                        detail,
                    }
                })?;
                handles.extend(self.expand_pattern(target, &pattern)?);
            }
        }

        debug!(requested = raw.len(), expanded = handles.len(), "expanded targets");
        Ok(handles)
    }

    fn expand_pattern(
        &self,
        target: &str,
        pattern: &WildcardPattern,
    ) -> Result<Vec<FileHandle>, CompileError> {
        let names = pattern.wildcard_names();
        let mut combos: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];

        for name in names {
            let values = self.values_for(target, name)?;
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in &values {
                    let mut extended = combo.clone();
                    extended.insert(name.to_string(), value.clone());
                    next.push(extended);
                }
            }
            combos = next;
        }

        combos
            .iter()
            .map(|combo| {
                pattern
                    .substitute(combo)
                    .map(|path| FileHandle::new(path, pattern.is_dir()))
                    .map_err(|missing| CompileError::UnresolvedWildcards {
                        rule: target.to_string(),
                        detail: format!("no value for {}", missing.join(", ")),
                    })
            })
            .collect()
    }

    fn values_for(&self, target: &str, name: &str) -> Result<Vec<String>, CompileError> {
        let source = self.def.wildcards().get(name).ok_or_else(|| {
            CompileError::UnresolvedWildcards {
                rule: target.to_string(),
                detail: format!("wildcard '{name}' has no [wildcards.{name}] source"),
            }
        })?;

        let values = match source {
            WildcardSource::Values(values) => values.clone(),
            WildcardSource::Param(param) => self
                .values
                .get(param)
                .map(ParamValue::to_wildcard_values)
                .ok_or_else(|| CompileError::MissingParameter {
                    name: param.clone(),
                    referenced_by: format!("wildcard '{name}'"),
                })?,
            WildcardSource::Glob(glob) => self.discover(target, name, glob)?,
        };

        if values.is_empty() {
            return Err(CompileError::UnresolvedWildcards {
                rule: target.to_string(),
                detail: format!("wildcard '{name}' expands to no values"),
            });
        }
        Ok(values)
    }

    /// Collect the values `name` takes in files matching `glob`.
    fn discover(&self, target: &str, name: &str, glob: &str) -> Result<Vec<String>, CompileError> {
        let pattern = WildcardPattern::parse(glob, &BTreeMap::new()).map_err(|detail| {
            CompileError::InvalidPattern {
                rule: format!("[wildcards.{name}]"),
                pattern: glob.to_string(),
                detail,
            }
        })?;

        let prefix = pattern.literal_dir_prefix();
        let root = if prefix.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(prefix.trim_end_matches('/'))
        };

        let files = list_relative_files(self.fs, &root).map_err(|e| {
            CompileError::UnresolvedWildcards {
                rule: target.to_string(),
                detail: format!("listing {}: {e}", root.display()),
            }
        })?;

        let mut found = BTreeSet::new();
        for rel in files {
            let full = normalize_path(&Path::new(&prefix).join(&rel).to_string_lossy());
            if let Some(value) = pattern.matches(&full).and_then(|mut m| m.remove(name)) {
                found.insert(value);
            }
        }

        debug!(wildcard = name, glob, values = found.len(), "discovered wildcard values");
        Ok(found.into_iter().collect())
    }
}
