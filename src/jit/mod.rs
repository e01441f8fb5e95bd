// src/jit/mod.rs

//! Two-phase just-in-time registration.
//!
//! Phase 1 ([`launcher`]) registers a fixed launcher task ahead of time.
//! Phase 2 ([`controller`]) runs inside that launcher: it compiles the
//! workflow against the concrete inputs, uploads the entrypoints, registers
//! the result as a new workflow version, waits for it to become visible and
//! launches it.

pub mod artifacts;
pub mod controller;
pub mod http;
pub mod launcher;
pub mod remote;
pub mod retry;
pub mod state;
pub mod wire;

use std::fmt;

use thiserror::Error;

use crate::errors::CompileError;
use crate::ident::encode;

pub use controller::{JitController, JitInvocation, JitReport, RemoteServices};
pub use launcher::{LauncherTask, register_launcher};
pub use remote::{
    ArtifactStore, ExecutionHandle, ExecutionService, LaunchRequest, RegisterOutcome,
    RegistrationKey, WorkflowId, WorkflowRegistry,
};
pub use retry::RetryPolicy;
pub use state::{InvalidTransition, JitState, JitStateMachine};
pub use wire::{ArtifactRef, SerializationError, WireWorkflow};

/// Failure reported by a remote collaborator.
///
/// `Display` is the service's message, unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure or 5xx; safe to retry.
    #[error("{0}")]
    Transient(String),

    /// The service refused the request; not retried.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{0}")]
    Unauthorized(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// Who is running the launcher. The execution id makes registrations of a
/// retried launcher idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionIdentity {
    pub execution_id: String,
    pub owner: String,
}

/// Version registered for one launcher execution: `<base>-<execution id>`.
///
/// Ids made of `[A-Za-z0-9.-]` are used as-is; any other id is escaped with
/// [`encode`], whose output always contains `_`. Distinct ids therefore
/// always yield distinct versions.
pub fn execution_version(base: &str, execution_id: &str) -> String {
    let plain = execution_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    if plain {
        format!("{base}-{execution_id}")
    } else {
        format!("{base}-{}", encode(execution_id))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JitError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("rendering entrypoints failed: {0}")]
    Render(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("this version already exists: {0}")]
    AlreadyExists(String),

    #[error("{key} did not become visible after {attempts} lookups")]
    VisibilityTimeout { key: RegistrationKey, attempts: u32 },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Terminal failure of a JIT invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct JitFailure {
    /// State the machine was in when the error occurred.
    pub failed_in: JitState,
    /// Every state entered, ending in `Failed`.
    pub transitions: Vec<JitState>,
    pub error: JitError,
}

impl fmt::Display for JitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for JitFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
