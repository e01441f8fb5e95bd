// src/entrypoint/description.rs

//! Typed description of what one task does when it runs.

use crate::compile::NodeId;
use crate::ident::ParameterIdentifier;
use crate::rules::JobBody;
use crate::types::ResourceRequest;

/// Copy an input value to the path the job body expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeStep {
    pub identifier: ParameterIdentifier,
    pub path: String,
    pub is_dir: bool,
}

/// Where a produced file is published after the body succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDestination {
    /// Requested target: published under the results root at its own path.
    Target { relative: String },
    /// Intermediate: published under the scratch root, keyed by identifier.
    Intermediate { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishStep {
    pub identifier: ParameterIdentifier,
    pub path: String,
    pub is_dir: bool,
    pub destination: PublishDestination,
}

/// Self-contained description of one task node.
///
/// References only the node's own parameter identifiers. This is the bridge
/// between identifier space (task graph) and path space (job body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableDescription {
    pub node: NodeId,
    pub name: String,
    pub rule: String,
    pub materialize: Vec<MaterializeStep>,
    /// Directories created before the body runs so outputs have a parent.
    pub prepare_dirs: Vec<String>,
    pub body: JobBody,
    pub resources: ResourceRequest,
    pub publish: Vec<PublishStep>,
}
