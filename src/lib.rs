// src/lib.rs

pub mod cli;
pub mod compile;
pub mod config;
pub mod entrypoint;
pub mod errors;
pub mod fs;
pub mod ident;
pub mod jit;
pub mod logging;
pub mod rules;
pub mod types;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::{CliArgs, Command, SelectionArgs};
use crate::compile::{BindingSource, CompiledGraph, compile_workflow};
use crate::config::loader::load_and_validate;
use crate::config::model::WorkflowDefinition;
use crate::errors::{Result, RuledagError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::jit::artifacts::LocalArtifactStore;
use crate::jit::http::{HttpArtifactStore, HttpRegistry};
use crate::jit::{
    ArtifactStore, ExecutionIdentity, JitController, JitError, JitInvocation, LauncherTask,
    RegisterOutcome, RemoteServices, RetryPolicy, register_launcher,
};
use crate::rules::TargetSelection;
use crate::types::ParamValue;

/// Environment variable consulted when `--owner` is not given.
pub const OWNER_ENV_VAR: &str = "RULEDAG_OWNER";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - definition loading and validation
/// - `check`: compile with defaults and print the task graph
/// - `register`: phase 1, the static launcher
/// - `jit`: phase 2, compile/register/launch for one execution
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let def = load_and_validate(&config_path)?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    match args.command {
        Command::Check(selection) => {
            let values = parse_params(&def, &selection.params)?;
            let values = def.effective_values(&values);
            let graph = compile_workflow(&def, fs.as_ref(), &values, &selection_of(&selection))?;
            print_check(&def, &graph);
            Ok(())
        }
        Command::Register { owner } => {
            let owner = resolve_owner(&def, owner);
            let task = LauncherTask::from_definition(&def, &owner, &args.config)?;
            let remote = remote_services(&def, Arc::clone(&fs))?;
            let retry = RetryPolicy::from(&def.config().retry);
            let outcome = register_launcher(
                &task,
                &def.config().artifact_prefix,
                remote.registry.as_ref(),
                remote.artifacts.as_ref(),
                &retry,
            )
            .await?;
            match outcome {
                RegisterOutcome::Registered => println!("registered launcher {}", task.key),
                RegisterOutcome::AlreadyExists(_) => {
                    println!("launcher {} already registered", task.key)
                }
            }
            Ok(())
        }
        Command::Jit {
            execution_id,
            owner,
            selection,
        } => {
            let values = parse_params(&def, &selection.params)?;
            let invocation = JitInvocation {
                identity: ExecutionIdentity {
                    execution_id,
                    owner: resolve_owner(&def, owner),
                },
                values,
                targets: selection_of(&selection),
            };
            let remote = remote_services(&def, Arc::clone(&fs))?;
            let controller = JitController::new(&def, fs.as_ref(), remote);
            let report = controller.run(&invocation).await?;

            info!(
                key = %report.key,
                nodes = report.nodes,
                reused = report.reused,
                "JIT registration complete"
            );
            println!("{}", report.execution.id);
            Ok(())
        }
    }
}

/// Parse `name=value` pairs against the declared parameter types.
pub fn parse_params(
    def: &WorkflowDefinition,
    raw: &[String],
) -> Result<BTreeMap<String, ParamValue>> {
    let mut values = BTreeMap::new();
    for pair in raw {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            RuledagError::ConfigError(format!("expected NAME=VALUE, got '{pair}'"))
        })?;
        let decl = def.params().get(name.trim()).ok_or_else(|| {
            RuledagError::ConfigError(format!("unknown parameter '{}'", name.trim()))
        })?;
        let value = decl.parse_value(value).map_err(RuledagError::ConfigError)?;
        values.insert(decl.name.clone(), value);
    }
    Ok(values)
}

fn selection_of(args: &SelectionArgs) -> TargetSelection {
    if args.targets.is_empty() {
        TargetSelection::Default
    } else {
        TargetSelection::explicit(args.targets.iter())
    }
}

fn resolve_owner(def: &WorkflowDefinition, cli: Option<String>) -> String {
    cli.or_else(|| std::env::var(OWNER_ENV_VAR).ok())
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| def.config().owner.clone())
}

/// Build the HTTP collaborators from `[config]`.
///
/// Without `artifact_url`, entrypoints are written below `artifact_dir`.
fn remote_services(def: &WorkflowDefinition, fs: Arc<dyn FileSystem>) -> Result<RemoteServices> {
    let cfg = def.config();
    let registry_url = cfg.registry_url.as_deref().ok_or_else(|| {
        RuledagError::ConfigError(
            "[config].registry_url is required to register workflows".to_string(),
        )
    })?;
    let registry =
        Arc::new(HttpRegistry::new(registry_url, cfg.timeout_secs).map_err(JitError::from)?);

    let artifacts: Arc<dyn ArtifactStore> = match cfg.artifact_url.as_deref() {
        Some(url) => Arc::new(
            HttpArtifactStore::new(url, cfg.timeout_secs).map_err(JitError::from)?,
        ),
        None => Arc::new(LocalArtifactStore::new(fs, &cfg.artifact_dir)),
    };

    Ok(RemoteServices {
        registry: registry.clone(),
        executor: registry,
        artifacts,
    })
}

/// Simple check output: print nodes, bindings and graph outputs.
fn print_check(def: &WorkflowDefinition, graph: &CompiledGraph) {
    println!("ruledag check: {} {}", def.name(), def.version());
    println!();

    if !graph.inputs().is_empty() {
        println!("inputs ({}):", graph.inputs().len());
        for (identifier, input) in graph.inputs() {
            match &input.path {
                Some(path) => println!("  - {identifier}: {} = {path}", input.ty),
                None => println!("  - {identifier}: {}", input.ty),
            }
        }
        println!();
    }

    println!("nodes ({}):", graph.nodes().len());
    for node in graph.nodes() {
        println!("  - {} (rule {})", node.name(), node.job.rule);
        for binding in &node.bindings {
            match &binding.source {
                BindingSource::Internal { node, output } => {
                    println!("      {} <- n{node}.{output}", binding.input)
                }
                BindingSource::External { param } => {
                    println!("      {} <- {param}", binding.input)
                }
            }
        }
        for output in &node.outputs {
            println!("      -> {} ({})", output.identifier, output.path);
        }
        if node.is_target {
            println!("      target: true");
        }
    }
    println!();

    println!("outputs ({}):", graph.outputs().len());
    for output in graph.outputs() {
        println!("  - {} from n{}: {}", output.identifier, output.node, output.path);
    }

    debug!("check complete (nothing registered)");
}
