// src/jit/remote.rs

//! Boundaries to the remote collaborators.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::jit::RemoteError;
use crate::jit::wire::WireWorkflow;

/// `(name, version, owner)` under which a workflow is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationKey {
    pub name: String,
    pub version: String,
    pub owner: String,
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.owner)
    }
}

/// Registry-assigned workflow id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a registration that the service accepted or recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The key is already registered; carries the service's message.
    AlreadyExists(String),
}

/// Launch of a visible workflow with concrete values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub workflow_id: WorkflowId,
    pub values: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    pub id: String,
}

#[async_trait]
pub trait WorkflowRegistry: Send + Sync {
    async fn register(
        &self,
        key: &RegistrationKey,
        workflow: &WireWorkflow,
    ) -> Result<RegisterOutcome, RemoteError>;

    /// `None` until the registration is visible.
    async fn lookup(&self, key: &RegistrationKey) -> Result<Option<WorkflowId>, RemoteError>;
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> Result<ExecutionHandle, RemoteError>;
}

/// Byte storage addressed by path. `put` must be idempotent.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, location: &str, bytes: Vec<u8>) -> Result<(), RemoteError>;
}
