// src/compile/mod.rs

//! Task graph compilation.

pub mod compiler;
pub mod graph;

pub use compiler::Compiler;
pub use graph::{
    Binding, BindingSource, CompiledGraph, GraphInput, GraphOutput, NodeId, NodeParam, TaskNode,
};

use std::collections::BTreeMap;

use crate::config::model::WorkflowDefinition;
use crate::errors::CompileError;
use crate::fs::FileSystem;
use crate::rules::{Extractor, TargetSelection};
use crate::types::ParamValue;

/// Extract and compile in one pass.
pub fn compile_workflow(
    def: &WorkflowDefinition,
    fs: &dyn FileSystem,
    values: &BTreeMap<String, ParamValue>,
    selection: &TargetSelection,
) -> Result<CompiledGraph, CompileError> {
    let dag = Extractor::new(def, fs, values).extract(selection)?;
    Compiler::new(def).compile(&dag)
}
