// src/rules/mod.rs

//! Rule graph extraction.
//!
//! Rules from the workflow definition are matched backwards from the
//! requested targets into concrete [`Job`]s, which are then assembled into an
//! acyclic [`JobDag`]. Edges come only from shared file paths.

pub mod body;
pub mod dag;
pub mod extract;
pub mod handle;
pub mod job;
pub mod pattern;
pub mod rule;
pub mod targets;

pub use dag::JobDag;
pub use extract::{Extractor, MAX_RESOLUTION_DEPTH};
pub use handle::{FileHandle, normalize_path};
pub use job::{Job, JobBody, JobId};
pub use pattern::WildcardPattern;
pub use rule::{Rule, RuleBody};
pub use targets::{RULE_TARGET_PREFIX, TargetSelection};
