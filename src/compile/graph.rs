// src/compile/graph.rs

//! Typed task graph produced by the compiler.

use std::collections::BTreeMap;

use crate::ident::ParameterIdentifier;
use crate::rules::{FileHandle, Job};
use crate::types::ParamType;

/// Node id, monotonic within one compilation and equal to the node's index.
pub type NodeId = usize;

/// A typed parameter of a task node.
///
/// `path` is where the job body expects the data; the entrypoint generator
/// materializes or collects the value there.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeParam {
    pub identifier: ParameterIdentifier,
    pub ty: ParamType,
    pub path: FileHandle,
}

/// Where an input value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    /// Output `output` of an earlier node.
    Internal {
        node: NodeId,
        output: ParameterIdentifier,
    },
    /// A graph-level input parameter.
    External { param: ParameterIdentifier },
}

/// Exactly one source per declared input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub input: ParameterIdentifier,
    pub source: BindingSource,
}

impl Binding {
    pub fn is_internal(&self) -> bool {
        matches!(self.source, BindingSource::Internal { .. })
    }
}

/// Compiled unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub id: NodeId,
    pub job: Job,
    pub inputs: Vec<NodeParam>,
    pub outputs: Vec<NodeParam>,
    /// At least one output is a requested final target.
    pub is_target: bool,
    pub bindings: Vec<Binding>,
}

impl TaskNode {
    /// Registry-facing task name, e.g. `n3_align`.
    pub fn name(&self) -> String {
        format!("n{}_{}", self.id, crate::ident::encode(&self.job.rule))
    }

    pub fn binding_for(&self, input: &ParameterIdentifier) -> Option<&Binding> {
        self.bindings.iter().find(|b| &b.input == input)
    }

    pub fn output(&self, identifier: &ParameterIdentifier) -> Option<&NodeParam> {
        self.outputs.iter().find(|o| &o.identifier == identifier)
    }
}

/// A graph-level input fed by a declared workflow parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphInput {
    /// Declared parameter name (`[params.<name>]`).
    pub param: String,
    pub ty: ParamType,
    /// Location jobs expect the data at.
    pub path: Option<FileHandle>,
}

/// A requested target and the node output that produces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOutput {
    pub identifier: ParameterIdentifier,
    pub node: NodeId,
    pub path: FileHandle,
}

/// Output of one compilation pass. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<TaskNode>,
    pub(crate) inputs: BTreeMap<ParameterIdentifier, GraphInput>,
    pub(crate) outputs: Vec<GraphOutput>,
}

impl CompiledGraph {
    /// Workflow name the graph was compiled from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn inputs(&self) -> &BTreeMap<ParameterIdentifier, GraphInput> {
        &self.inputs
    }

    pub fn outputs(&self) -> &[GraphOutput] {
        &self.outputs
    }

    /// Node producing the given output identifier.
    pub fn producer_of(&self, identifier: &ParameterIdentifier) -> Option<&TaskNode> {
        self.nodes
            .iter()
            .find(|n| n.outputs.iter().any(|o| &o.identifier == identifier))
    }
}
