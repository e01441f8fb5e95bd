#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use ruledag::compile::{CompiledGraph, compile_workflow};
use ruledag::config::WorkflowDefinition;
use ruledag::fs::mock::MockFileSystem;
use ruledag::jit::RemoteServices;
use ruledag::rules::TargetSelection;
use ruledag_test_utils::builders::{ParamBuilder, RuleBuilder, WorkflowBuilder};
use ruledag_test_utils::fakes::{FakeArtifactStore, FakeExecutionService, FakeRegistry};

pub use ruledag_test_utils::init_tracing;

/// Fakes plus the `RemoteServices` handle wired to them.
pub struct Remote {
    pub registry: Arc<FakeRegistry>,
    pub executor: Arc<FakeExecutionService>,
    pub artifacts: Arc<FakeArtifactStore>,
}

impl Remote {
    pub fn new(registry: FakeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            executor: Arc::new(FakeExecutionService::new()),
            artifacts: Arc::new(FakeArtifactStore::new()),
        }
    }

    pub fn services(&self) -> RemoteServices {
        RemoteServices {
            registry: self.registry.clone(),
            executor: self.executor.clone(),
            artifacts: self.artifacts.clone(),
        }
    }
}

/// Compile with default values against an empty filesystem.
pub fn compile_defaults(def: &WorkflowDefinition) -> Result<CompiledGraph, ruledag::errors::CompileError> {
    let fs = MockFileSystem::new();
    compile_workflow(def, &fs, &BTreeMap::new(), &TargetSelection::Default)
}

/// `jobA: -> out.txt`, `jobB: out.txt -> final.txt`, target `final.txt`.
pub fn two_step_chain() -> WorkflowDefinition {
    WorkflowBuilder::new("chain")
        .target("final.txt")
        .rule("jobA", RuleBuilder::shell("echo a > {output}").output("out.txt"))
        .rule(
            "jobB",
            RuleBuilder::shell("cp {input} {output}")
                .input("out.txt")
                .output("final.txt"),
        )
        .build()
}

/// Per-sample pipeline reading files from a declared directory parameter.
pub fn sample_pipeline() -> WorkflowDefinition {
    sample_builder().build()
}

/// Builder behind [`sample_pipeline`], for tests that tune `[config]`.
pub fn sample_builder() -> WorkflowBuilder {
    WorkflowBuilder::new("samples")
        .owner("lab")
        .target("results/{sample}.txt")
        .param("raw", ParamBuilder::directory("raw/"))
        .param(
            "samples",
            ParamBuilder::new("string")
                .list()
                .default_value("[\"a\", \"b\"]"),
        )
        .param(
            "threshold",
            ParamBuilder::new("integer").default_value("5"),
        )
        .wildcard_param("sample", "samples")
        .rule(
            "clean",
            RuleBuilder::shell("clean --min {params.threshold} {input} > {output}")
                .input("raw/{sample}.txt")
                .output("clean/{sample}.txt")
                .log("logs/clean/{sample}.log"),
        )
        .rule(
            "summarize",
            RuleBuilder::shell("wc -l {input} > {output}")
                .input("clean/{sample}.txt")
                .output("results/{sample}.txt")
                .resources(2, 2048, 0),
        )
}
