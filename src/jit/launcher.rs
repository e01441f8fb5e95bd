// src/jit/launcher.rs

//! Phase 1: the statically registered launcher task.

use tracing::info;

use crate::config::model::WorkflowDefinition;
use crate::entrypoint::render::render_launcher;
use crate::ident::IdentifierResolver;
use crate::jit::remote::{ArtifactStore, RegisterOutcome, RegistrationKey, WorkflowRegistry};
use crate::jit::retry::RetryPolicy;
use crate::jit::wire::{
    ArtifactRef, WireBinding, WireNode, WireOutput, WireParam, WireSource, WireWorkflow,
    wire_type,
};
use crate::jit::artifacts::artifact_ref;
use crate::jit::JitError;
use crate::types::{ParamType, ResourceRequest};

/// Name of the launcher's only output.
pub const SUCCESS_OUTPUT: &str = "success";

/// A single task whose inputs are the workflow's declared parameters and
/// whose output is a success flag. It knows nothing about the job DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherTask {
    pub key: RegistrationKey,
    /// `(declared name, identifier, type)` per parameter.
    pub params: Vec<(String, String, ParamType)>,
    pub script: String,
}

impl LauncherTask {
    pub fn from_definition(
        def: &WorkflowDefinition,
        owner: &str,
        config_path: &str,
    ) -> Result<Self, JitError> {
        let mut ids = IdentifierResolver::new();
        let mut params = Vec::with_capacity(def.params().len());
        for decl in def.params().values() {
            let identifier = ids.resolve_param(&decl.name)?;
            params.push((decl.name.clone(), identifier.to_string(), decl.ty.clone()));
        }

        let pairs: Vec<(String, String)> = params
            .iter()
            .map(|(name, id, _)| (name.clone(), id.clone()))
            .collect();
        let script = render_launcher(def.name(), def.version(), config_path, &pairs)
            .map_err(|e| JitError::Render(format!("{e:#}")))?;

        Ok(Self {
            key: RegistrationKey {
                name: def.name().to_string(),
                version: def.version().to_string(),
                owner: owner.to_string(),
            },
            params,
            script,
        })
    }

    /// Wire form of the one-node launcher workflow.
    pub fn to_wire(&self, artifact: ArtifactRef) -> Result<WireWorkflow, JitError> {
        let inputs = self
            .params
            .iter()
            .map(|(_, id, ty)| {
                Ok(WireParam {
                    name: id.clone(),
                    ty: wire_type(id, ty)?,
                })
            })
            .collect::<Result<Vec<_>, JitError>>()?;

        let success = WireParam {
            name: SUCCESS_OUTPUT.to_string(),
            ty: ParamType::Boolean.to_string(),
        };

        Ok(WireWorkflow {
            name: self.key.name.clone(),
            version: self.key.version.clone(),
            owner: self.key.owner.clone(),
            inputs: inputs.clone(),
            outputs: vec![WireOutput {
                name: SUCCESS_OUTPUT.to_string(),
                node: 0,
                path: SUCCESS_OUTPUT.to_string(),
            }],
            nodes: vec![WireNode {
                id: 0,
                name: "launcher".to_string(),
                rule: "launcher".to_string(),
                bindings: inputs
                    .iter()
                    .map(|p| WireBinding {
                        input: p.name.clone(),
                        source: WireSource::Param {
                            param: p.name.clone(),
                        },
                    })
                    .collect(),
                inputs,
                outputs: vec![success],
                resources: ResourceRequest::default(),
                is_target: true,
                artifact,
            }],
        })
    }
}

/// Upload the launcher script and register the launcher workflow.
///
/// An existing registration of the same version is reported, not treated as
/// an error: the launcher is static and re-registering it is a no-op.
pub async fn register_launcher(
    task: &LauncherTask,
    artifact_prefix: &str,
    registry: &dyn WorkflowRegistry,
    artifacts: &dyn ArtifactStore,
    retry: &RetryPolicy,
) -> Result<RegisterOutcome, JitError> {
    let bytes = task.script.clone().into_bytes();
    let reference = artifact_ref(artifact_prefix, &task.key, "launcher", &bytes);
    let location = reference.location.clone();

    retry
        .run("upload launcher", || artifacts.put(&location, bytes.clone()))
        .await?;

    let wire = task.to_wire(reference)?;
    let outcome = retry
        .run("register launcher", || registry.register(&task.key, &wire))
        .await?;

    match &outcome {
        RegisterOutcome::Registered => info!(key = %task.key, "registered launcher"),
        RegisterOutcome::AlreadyExists(_) => {
            info!(key = %task.key, "launcher already registered")
        }
    }
    Ok(outcome)
}
