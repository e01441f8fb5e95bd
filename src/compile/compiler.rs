// src/compile/compiler.rs

//! Job DAG -> typed task graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::compile::graph::{
    Binding, BindingSource, CompiledGraph, GraphInput, GraphOutput, NodeId, NodeParam, TaskNode,
};
use crate::config::model::{ParamDecl, WorkflowDefinition};
use crate::errors::CompileError;
use crate::ident::{IdentifierResolver, ParameterIdentifier};
use crate::rules::{FileHandle, Job, JobDag, JobId};
use crate::types::ParamType;

/// Compiles job DAGs against one workflow definition.
///
/// Each call to [`Compiler::compile`] uses a fresh identifier resolver and
/// node counter, so concurrent or repeated compilations never share state.
pub struct Compiler<'a> {
    def: &'a WorkflowDefinition,
}

impl<'a> Compiler<'a> {
    pub fn new(def: &'a WorkflowDefinition) -> Self {
        Self { def }
    }

    pub fn compile(&self, dag: &JobDag) -> Result<CompiledGraph, CompileError> {
        let producers = producer_index(dag)?;
        let order = topological_order(dag)?;
        let params = ParamIndex::new(self.def);

        let mut resolver = IdentifierResolver::new();
        let targets: HashSet<&FileHandle> = dag.targets().iter().collect();
        let mut nodes: Vec<TaskNode> = Vec::with_capacity(order.len());
        let mut published: HashMap<FileHandle, Published> = HashMap::new();
        let mut graph_inputs: BTreeMap<ParameterIdentifier, GraphInput> = BTreeMap::new();

        for job_id in order {
            let job = dag
                .job(job_id)
                .ok_or_else(|| CompileError::UnknownRule(format!("job #{job_id}")))?;
            let node_id = nodes.len();

            let mut inputs: Vec<NodeParam> = Vec::new();
            let mut bindings: Vec<Binding> = Vec::new();
            for handle in &job.inputs {
                let (param, source) = if producers.contains_key(handle) {
                    let upstream = published.get(handle).cloned().ok_or_else(|| {
                        CompileError::Cycle {
                            jobs: vec![job.label()],
                        }
                    })?;
                    let identifier = resolver.resolve(handle)?;
                    // The consumer sees the output with the producer's type.
                    let is_dir = upstream.ty == ParamType::Directory;
                    let path = FileHandle::new(handle.as_str(), is_dir);
                    (
                        NodeParam {
                            identifier,
                            ty: upstream.ty,
                            path,
                        },
                        BindingSource::Internal {
                            node: upstream.node,
                            output: upstream.identifier,
                        },
                    )
                } else if let Some(decl) = params.lookup(handle) {
                    let identifier = resolver.resolve_param(&decl.name)?;
                    let path = decl
                        .path
                        .as_deref()
                        .map(|p| FileHandle::new(p, decl.ty == ParamType::Directory))
                        .unwrap_or_else(|| handle.clone());
                    graph_inputs
                        .entry(identifier.clone())
                        .or_insert_with(|| GraphInput {
                            param: decl.name.clone(),
                            ty: decl.ty.clone(),
                            path: Some(path.clone()),
                        });
                    (
                        NodeParam {
                            identifier: identifier.clone(),
                            ty: decl.ty.clone(),
                            path,
                        },
                        BindingSource::External { param: identifier },
                    )
                } else {
                    return Err(CompileError::DanglingInput {
                        rule: job.label(),
                        path: PathBuf::from(handle.as_str()),
                    });
                };

                if inputs.iter().any(|i| i.identifier == param.identifier) {
                    continue;
                }
                bindings.push(Binding {
                    input: param.identifier.clone(),
                    source,
                });
                inputs.push(param);
            }

            let mut outputs: Vec<NodeParam> = Vec::new();
            for handle in job.products() {
                let identifier = resolver.resolve(handle)?;
                let ty = ParamType::file_or_dir(handle.is_dir());
                published.insert(
                    handle.clone(),
                    Published {
                        node: node_id,
                        identifier: identifier.clone(),
                        ty: ty.clone(),
                    },
                );
                outputs.push(NodeParam {
                    identifier,
                    ty,
                    path: handle.clone(),
                });
            }

            let is_target = job.products().any(|h| targets.contains(h));
            debug!(
                node = node_id,
                job = %job.label(),
                inputs = inputs.len(),
                outputs = outputs.len(),
                is_target,
                "compiled task node"
            );

            nodes.push(TaskNode {
                id: node_id,
                job: job.clone(),
                inputs,
                outputs,
                is_target,
                bindings,
            });
        }

        let mut outputs: Vec<GraphOutput> = Vec::new();
        let mut seen: BTreeSet<ParameterIdentifier> = BTreeSet::new();
        for target in dag.targets() {
            let Published {
                node, identifier, ..
            } = published
                .get(target)
                .cloned()
                .ok_or_else(|| CompileError::NoProducerForTarget {
                    path: PathBuf::from(target.as_str()),
                })?;
            if seen.insert(identifier.clone()) {
                outputs.push(GraphOutput {
                    identifier,
                    node,
                    path: target.clone(),
                });
            }
        }

        info!(
            workflow = self.def.name(),
            nodes = nodes.len(),
            inputs = graph_inputs.len(),
            outputs = outputs.len(),
            "compiled task graph"
        );

        Ok(CompiledGraph {
            name: self.def.name().to_string(),
            nodes,
            inputs: graph_inputs,
            outputs,
        })
    }
}

/// An output already assigned to a compiled node.
#[derive(Debug, Clone)]
struct Published {
    node: NodeId,
    identifier: ParameterIdentifier,
    ty: ParamType,
}

/// `FileHandle -> producing job`. A second producer for the same handle is
/// rejected.
fn producer_index(dag: &JobDag) -> Result<HashMap<&FileHandle, JobId>, CompileError> {
    let mut index: HashMap<&FileHandle, JobId> = HashMap::new();
    for job in dag.jobs() {
        for handle in job.products() {
            if let Some(existing) = index.insert(handle, job.id) {
                if existing == job.id {
                    continue;
                }
                let mut producers: Vec<String> = [existing, job.id]
                    .iter()
                    .filter_map(|id| dag.job(*id).map(Job::label))
                    .collect();
                producers.sort();
                return Err(CompileError::AmbiguousProducer {
                    path: PathBuf::from(handle.as_str()),
                    producers,
                });
            }
        }
    }
    Ok(index)
}

/// Kahn's algorithm. Ties are broken by (rule name, first product, job id)
/// so the order is stable across runs on the same DAG.
fn topological_order(dag: &JobDag) -> Result<Vec<JobId>, CompileError> {
    let mut indegree: Vec<usize> = dag.jobs().iter().map(|j| j.upstream.len()).collect();

    let key = |id: JobId| -> (String, String, JobId) {
        let (rule, first) = dag.jobs()[id].sort_key();
        (rule.to_string(), first.to_string(), id)
    };

    let mut ready: BTreeSet<(String, String, JobId)> = dag
        .jobs()
        .iter()
        .filter(|j| j.upstream.is_empty())
        .map(|j| key(j.id))
        .collect();

    let mut ordered = Vec::with_capacity(dag.len());
    while let Some(next) = ready.pop_first() {
        let id = next.2;
        ordered.push(id);
        if let Some(children) = dag.dependents_of(id) {
            for child in children {
                indegree[*child] -= 1;
                if indegree[*child] == 0 {
                    ready.insert(key(*child));
                }
            }
        }
    }

    if ordered.len() != dag.len() {
        let mut jobs: Vec<String> = dag
            .jobs()
            .iter()
            .filter(|j| !ordered.contains(&j.id))
            .map(Job::label)
            .collect();
        jobs.sort();
        return Err(CompileError::Cycle { jobs });
    }
    Ok(ordered)
}

/// Declared path parameters, by exact path and by directory prefix.
struct ParamIndex<'a> {
    exact: HashMap<FileHandle, &'a ParamDecl>,
    dirs: Vec<(FileHandle, &'a ParamDecl)>,
}

impl<'a> ParamIndex<'a> {
    fn new(def: &'a WorkflowDefinition) -> Self {
        let mut exact = HashMap::new();
        let mut dirs = Vec::new();
        for decl in def.params().values() {
            let Some(path) = decl.path.as_deref() else {
                continue;
            };
            let is_dir = decl.ty == ParamType::Directory;
            let handle = FileHandle::new(path, is_dir);
            if is_dir {
                dirs.push((handle.clone(), decl));
            }
            exact.insert(handle, decl);
        }
        // Longest directory first so nested directory params win.
        dirs.sort_by(|a, b| b.0.as_str().len().cmp(&a.0.as_str().len()));
        Self { exact, dirs }
    }

    fn lookup(&self, handle: &FileHandle) -> Option<&'a ParamDecl> {
        if let Some(decl) = self.exact.get(handle) {
            return Some(*decl);
        }
        self.dirs
            .iter()
            .find(|(dir, _)| handle.is_under(dir))
            .map(|(_, decl)| *decl)
    }
}
