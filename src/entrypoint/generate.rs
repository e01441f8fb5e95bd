// src/entrypoint/generate.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::compile::{CompiledGraph, NodeId, TaskNode};
use crate::entrypoint::description::{
    ExecutableDescription, MaterializeStep, PublishDestination, PublishStep,
};
use crate::rules::FileHandle;

/// Build one [`ExecutableDescription`] per task node.
///
/// Pure: no text is rendered and nothing is written.
pub fn generate(graph: &CompiledGraph) -> BTreeMap<NodeId, ExecutableDescription> {
    let targets: HashSet<&FileHandle> = graph.outputs().iter().map(|o| &o.path).collect();

    graph
        .nodes()
        .iter()
        .map(|node| (node.id, describe(node, &targets)))
        .collect()
}

fn describe(node: &TaskNode, targets: &HashSet<&FileHandle>) -> ExecutableDescription {
    let materialize = node
        .inputs
        .iter()
        .map(|input| MaterializeStep {
            identifier: input.identifier.clone(),
            path: input.path.as_str().to_string(),
            is_dir: input.path.is_dir(),
        })
        .collect();

    let prepare_dirs: BTreeSet<String> = node
        .outputs
        .iter()
        .filter_map(|o| o.path.parent().map(str::to_string))
        .collect();

    let publish = node
        .outputs
        .iter()
        .map(|output| {
            let destination = if targets.contains(&output.path) {
                PublishDestination::Target {
                    relative: output.path.as_str().trim_start_matches('/').to_string(),
                }
            } else {
                PublishDestination::Intermediate {
                    key: output.identifier.as_str().to_string(),
                }
            };
            PublishStep {
                identifier: output.identifier.clone(),
                path: output.path.as_str().to_string(),
                is_dir: output.path.is_dir(),
                destination,
            }
        })
        .collect();

    debug!(node = node.id, rule = %node.job.rule, "described entrypoint");

    ExecutableDescription {
        node: node.id,
        name: node.name(),
        rule: node.job.rule.clone(),
        materialize,
        prepare_dirs: prepare_dirs.into_iter().collect(),
        body: node.job.body.clone(),
        resources: node.job.resources,
        publish,
    }
}
