// src/rules/job.rs

//! Concrete rule invocations.

use std::collections::{BTreeMap, BTreeSet};

use crate::rules::handle::FileHandle;
use crate::types::ResourceRequest;

/// Index of a job inside its [`JobDag`](crate::rules::JobDag).
pub type JobId = usize;

/// What a job runs, with every placeholder already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobBody {
    Shell(String),
    Script(String),
}

/// One rule invocation with concrete inputs and outputs.
///
/// Jobs are populated once by the extractor; `upstream` is filled in when the
/// [`JobDag`](crate::rules::JobDag) is built and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub rule: String,
    pub wildcards: BTreeMap<String, String>,
    pub inputs: Vec<FileHandle>,
    pub outputs: Vec<FileHandle>,
    pub logs: Vec<FileHandle>,
    pub resources: ResourceRequest,
    pub body: JobBody,
    pub upstream: BTreeSet<JobId>,
}

impl Job {
    /// Human-readable label such as `align[sample=a]`.
    pub fn label(&self) -> String {
        if self.wildcards.is_empty() {
            return self.rule.clone();
        }
        let parts: Vec<String> = self
            .wildcards
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}[{}]", self.rule, parts.join(","))
    }

    /// Everything this job writes: outputs, then logs.
    pub fn products(&self) -> impl Iterator<Item = &FileHandle> {
        self.outputs.iter().chain(self.logs.iter())
    }

    /// Stable ordering key: rule name, then first produced path.
    pub fn sort_key(&self) -> (&str, &str) {
        let first = self.products().next().map(|h| h.as_str()).unwrap_or("");
        (&self.rule, first)
    }
}
