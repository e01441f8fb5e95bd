// src/jit/controller.rs

//! Phase 2: compile, serialize, upload, register, await visibility, launch.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::compile::{CompiledGraph, compile_workflow};
use crate::config::model::WorkflowDefinition;
use crate::errors::CompileError;
use crate::fs::FileSystem;
use crate::jit::artifacts::{PackagedArtifact, package_entrypoints};
use crate::jit::remote::{
    ArtifactStore, ExecutionHandle, ExecutionService, LaunchRequest, RegisterOutcome,
    RegistrationKey, WorkflowId, WorkflowRegistry,
};
use crate::jit::retry::RetryPolicy;
use crate::jit::state::{JitState, JitStateMachine};
use crate::jit::wire::{WireWorkflow, encode_workflow, value_to_json};
use crate::jit::{ExecutionIdentity, JitError, JitFailure, RemoteError, execution_version};
use crate::rules::TargetSelection;
use crate::types::{ExistingVersionPolicy, ParamValue};

/// Remote collaborators used by the controller.
#[derive(Clone)]
pub struct RemoteServices {
    pub registry: Arc<dyn WorkflowRegistry>,
    pub executor: Arc<dyn ExecutionService>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// Inputs of one launcher execution.
#[derive(Debug, Clone)]
pub struct JitInvocation {
    pub identity: ExecutionIdentity,
    pub values: BTreeMap<String, ParamValue>,
    pub targets: TargetSelection,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct JitReport {
    pub key: RegistrationKey,
    pub workflow_id: WorkflowId,
    pub execution: ExecutionHandle,
    pub nodes: usize,
    /// Registration was already present and reused.
    pub reused: bool,
    pub transitions: Vec<JitState>,
}

/// Runs the registration state machine for one workflow definition.
pub struct JitController<'a> {
    def: &'a WorkflowDefinition,
    fs: &'a dyn FileSystem,
    remote: RemoteServices,
    retry: RetryPolicy,
    poll: RetryPolicy,
}

/// Output of the serializing step.
struct Prepared {
    wire: WireWorkflow,
    artifacts: Vec<PackagedArtifact>,
    launch_values: BTreeMap<String, serde_json::Value>,
}

impl<'a> JitController<'a> {
    pub fn new(def: &'a WorkflowDefinition, fs: &'a dyn FileSystem, remote: RemoteServices) -> Self {
        Self {
            def,
            fs,
            remote,
            retry: RetryPolicy::from(&def.config().retry),
            poll: RetryPolicy::from(&def.config().poll),
        }
    }

    /// Key the given identity registers under.
    pub fn registration_key(&self, identity: &ExecutionIdentity) -> RegistrationKey {
        RegistrationKey {
            name: self.def.name().to_string(),
            version: execution_version(self.def.version(), &identity.execution_id),
            owner: identity.owner.clone(),
        }
    }

    pub async fn run(&self, invocation: &JitInvocation) -> Result<JitReport, Box<JitFailure>> {
        let mut sm = JitStateMachine::new();
        let key = self.registration_key(&invocation.identity);
        info!(key = %key, execution = %invocation.identity.execution_id, "starting JIT registration");

        // Compiling
        let graph = match self.compile(invocation) {
            Ok(graph) => graph,
            Err(e) => return Err(fail(&mut sm, e)),
        };

        // Serializing
        step(&mut sm, JitState::Serializing)?;
        let prepared = match self.prepare(&graph, &key, invocation) {
            Ok(p) => p,
            Err(e) => return Err(fail(&mut sm, e)),
        };

        // Uploading
        step(&mut sm, JitState::Uploading)?;
        if let Err(e) = self.upload(prepared.artifacts).await {
            return Err(fail(&mut sm, e));
        }

        // Registering
        step(&mut sm, JitState::Registering)?;
        let reused = match self.register(&key, &prepared.wire).await {
            Ok(reused) => reused,
            Err(e) => return Err(fail(&mut sm, e)),
        };

        // AwaitingVisibility
        step(&mut sm, JitState::AwaitingVisibility)?;
        let workflow_id = match self.await_visibility(&mut sm, &key).await {
            Ok(id) => id,
            Err(e) => return Err(fail(&mut sm, e)),
        };

        // Launching
        step(&mut sm, JitState::Launching)?;
        let request = LaunchRequest {
            workflow_id: workflow_id.clone(),
            values: prepared.launch_values,
        };
        let execution = match self
            .retry
            .run("launch", || self.remote.executor.launch(&request))
            .await
        {
            Ok(handle) => handle,
            Err(e) => return Err(fail(&mut sm, e.into())),
        };

        step(&mut sm, JitState::Done)?;
        info!(key = %key, workflow = %workflow_id, execution = %execution.id, "launched workflow");

        Ok(JitReport {
            key,
            workflow_id,
            execution,
            nodes: graph.nodes().len(),
            reused,
            transitions: sm.history().to_vec(),
        })
    }

    fn compile(&self, invocation: &JitInvocation) -> Result<CompiledGraph, JitError> {
        let values = self.def.effective_values(&invocation.values);
        let graph = compile_workflow(self.def, self.fs, &values, &invocation.targets)?;

        for input in graph.inputs().values() {
            if !values.contains_key(&input.param) {
                return Err(CompileError::MissingParameter {
                    name: input.param.clone(),
                    referenced_by: "graph inputs".to_string(),
                }
                .into());
            }
        }
        Ok(graph)
    }

    fn prepare(
        &self,
        graph: &CompiledGraph,
        key: &RegistrationKey,
        invocation: &JitInvocation,
    ) -> Result<Prepared, JitError> {
        let packaged = package_entrypoints(graph, key, self.def.config())?;
        let refs = packaged
            .iter()
            .map(|(node, p)| (*node, p.reference.clone()))
            .collect();
        let wire = encode_workflow(graph, key, &refs)?;

        let values = self.def.effective_values(&invocation.values);
        let mut launch_values = BTreeMap::new();
        for (identifier, input) in graph.inputs() {
            if let Some(value) = values.get(&input.param) {
                launch_values.insert(identifier.to_string(), value_to_json(&input.param, value)?);
            }
        }

        Ok(Prepared {
            wire,
            artifacts: packaged.into_values().collect(),
            launch_values,
        })
    }

    /// Upload every artifact concurrently; locations never overlap.
    async fn upload(&self, artifacts: Vec<PackagedArtifact>) -> Result<(), JitError> {
        let mut set = JoinSet::new();
        for artifact in artifacts {
            let store = Arc::clone(&self.remote.artifacts);
            let retry = self.retry;
            set.spawn(async move {
                let location = artifact.reference.location;
                let bytes = artifact.bytes;
                retry
                    .run("upload", || store.put(&location, bytes.clone()))
                    .await
            });
        }

        let mut first_error: Option<JitError> = None;
        while let Some(joined) = set.join_next().await {
            let result = joined
                .map_err(|e| JitError::Remote(RemoteError::Transient(e.to_string())))
                .and_then(|r| r.map_err(JitError::from));
            if let Err(e) = result {
                if first_error.is_none() {
                    set.abort_all();
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns whether an existing registration was reused.
    async fn register(&self, key: &RegistrationKey, wire: &WireWorkflow) -> Result<bool, JitError> {
        let outcome = self
            .retry
            .run("register", || self.remote.registry.register(key, wire))
            .await?;

        match (outcome, self.def.config().on_existing_version) {
            (RegisterOutcome::Registered, _) => {
                info!(key = %key, "registered workflow");
                Ok(false)
            }
            (RegisterOutcome::AlreadyExists(message), ExistingVersionPolicy::Fail) => {
                Err(JitError::AlreadyExists(message))
            }
            (RegisterOutcome::AlreadyExists(message), ExistingVersionPolicy::Reuse) => {
                warn!(key = %key, message = %message, "version already registered, reusing it");
                Ok(true)
            }
        }
    }

    /// Bounded lookup loop with exponential backoff.
    async fn await_visibility(
        &self,
        sm: &mut JitStateMachine,
        key: &RegistrationKey,
    ) -> Result<WorkflowId, JitError> {
        let mut attempt = 1;
        loop {
            match self.remote.registry.lookup(key).await {
                Ok(Some(id)) => return Ok(id),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(key = %key, attempt, error = %e, "lookup failed, will poll again");
                }
                Err(e) => return Err(e.into()),
            }

            if attempt >= self.poll.max_attempts {
                return Err(JitError::VisibilityTimeout {
                    key: key.clone(),
                    attempts: attempt,
                });
            }
            tokio::time::sleep(self.poll.delay_for(attempt)).await;
            attempt += 1;
            sm.advance(JitState::AwaitingVisibility)?;
        }
    }
}

/// Advance, turning an invalid transition into a failure.
fn step(sm: &mut JitStateMachine, next: JitState) -> Result<(), Box<JitFailure>> {
    sm.advance(next).map_err(|e| fail(sm, e.into()))
}

fn fail(sm: &mut JitStateMachine, error: JitError) -> Box<JitFailure> {
    let failed_in = sm.current();
    if let Err(e) = sm.advance(JitState::Failed) {
        warn!(error = %e, "state machine already terminal");
    }
    error!(state = %failed_in, error = %error, "JIT registration failed");
    Box::new(JitFailure {
        failed_in,
        transitions: sm.history().to_vec(),
        error,
    })
}
