// src/jit/wire.rs

//! Wire format of a registered workflow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compile::{BindingSource, CompiledGraph, NodeId, NodeParam};
use crate::jit::remote::RegistrationKey;
use crate::types::{ParamType, ParamValue, ResourceRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("parameter {param} has type {ty}, which the registry cannot represent")]
    UnsupportedType { param: String, ty: String },

    #[error("parameter {param} has a non-finite float value")]
    NonFiniteFloat { param: String },

    #[error("node {node} has no generated artifact")]
    MissingArtifact { node: NodeId },

    #[error("encoding workflow failed: {0}")]
    Encode(String),
}

/// Location and digest of an uploaded entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub location: String,
    /// blake3 of the content, hex.
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireWorkflow {
    pub name: String,
    pub version: String,
    pub owner: String,
    pub inputs: Vec<WireParam>,
    pub outputs: Vec<WireOutput>,
    pub nodes: Vec<WireNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOutput {
    pub name: String,
    pub node: NodeId,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBinding {
    pub input: String,
    #[serde(flatten)]
    pub source: WireSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum WireSource {
    Node { node: NodeId, output: String },
    Param { param: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    pub id: NodeId,
    pub name: String,
    pub rule: String,
    pub inputs: Vec<WireParam>,
    pub outputs: Vec<WireParam>,
    pub bindings: Vec<WireBinding>,
    pub resources: ResourceRequest,
    pub is_target: bool,
    pub artifact: ArtifactRef,
}

/// Serialize a compiled graph. Every node must have an artifact.
pub fn encode_workflow(
    graph: &CompiledGraph,
    key: &RegistrationKey,
    artifacts: &BTreeMap<NodeId, ArtifactRef>,
) -> Result<WireWorkflow, SerializationError> {
    let inputs = graph
        .inputs()
        .iter()
        .map(|(id, input)| {
            Ok(WireParam {
                name: id.to_string(),
                ty: wire_type(id.as_str(), &input.ty)?,
            })
        })
        .collect::<Result<Vec<_>, SerializationError>>()?;

    let outputs = graph
        .outputs()
        .iter()
        .map(|o| WireOutput {
            name: o.identifier.to_string(),
            node: o.node,
            path: o.path.as_str().to_string(),
        })
        .collect();

    let mut nodes = Vec::with_capacity(graph.nodes().len());
    for node in graph.nodes() {
        let artifact = artifacts
            .get(&node.id)
            .cloned()
            .ok_or(SerializationError::MissingArtifact { node: node.id })?;
        nodes.push(WireNode {
            id: node.id,
            name: node.name(),
            rule: node.job.rule.clone(),
            inputs: wire_params(&node.inputs)?,
            outputs: wire_params(&node.outputs)?,
            bindings: node
                .bindings
                .iter()
                .map(|b| WireBinding {
                    input: b.input.to_string(),
                    source: match &b.source {
                        BindingSource::Internal { node, output } => WireSource::Node {
                            node: *node,
                            output: output.to_string(),
                        },
                        BindingSource::External { param } => WireSource::Param {
                            param: param.to_string(),
                        },
                    },
                })
                .collect(),
            resources: node.job.resources,
            is_target: node.is_target,
            artifact,
        });
    }

    Ok(WireWorkflow {
        name: key.name.clone(),
        version: key.version.clone(),
        owner: key.owner.clone(),
        inputs,
        outputs,
        nodes,
    })
}

/// Convert a launch value, rejecting NaN and infinities.
pub fn value_to_json(
    param: &str,
    value: &ParamValue,
) -> Result<serde_json::Value, SerializationError> {
    match value {
        ParamValue::Float(x) if !x.is_finite() => Err(SerializationError::NonFiniteFloat {
            param: param.to_string(),
        }),
        ParamValue::List(items) => items
            .iter()
            .map(|item| value_to_json(param, item))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        other => {
            serde_json::to_value(other).map_err(|e| SerializationError::Encode(e.to_string()))
        }
    }
}

/// Registry type name. Lists of lists are not representable.
pub fn wire_type(param: &str, ty: &ParamType) -> Result<String, SerializationError> {
    if let ParamType::List(inner) = ty {
        if matches!(**inner, ParamType::List(_)) {
            return Err(SerializationError::UnsupportedType {
                param: param.to_string(),
                ty: ty.to_string(),
            });
        }
    }
    Ok(ty.to_string())
}

fn wire_params(params: &[NodeParam]) -> Result<Vec<WireParam>, SerializationError> {
    params
        .iter()
        .map(|p| {
            Ok(WireParam {
                name: p.identifier.to_string(),
                ty: wire_type(p.identifier.as_str(), &p.ty)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lists_are_unsupported() {
        let nested = ParamType::List(Box::new(ParamType::List(Box::new(ParamType::File))));
        assert!(matches!(
            wire_type("p_x", &nested),
            Err(SerializationError::UnsupportedType { .. })
        ));
        assert_eq!(
            wire_type("p_x", &ParamType::List(Box::new(ParamType::Integer))).unwrap(),
            "list<integer>"
        );
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = value_to_json("ratio", &ParamValue::List(vec![ParamValue::Float(f64::NAN)]))
            .unwrap_err();
        assert_eq!(
            err,
            SerializationError::NonFiniteFloat {
                param: "ratio".to_string()
            }
        );
        assert_eq!(
            value_to_json("n", &ParamValue::Int(3)).unwrap(),
            serde_json::json!(3)
        );
    }

    #[test]
    fn bindings_serialize_with_a_source_tag() {
        let binding = WireBinding {
            input: "r_a".to_string(),
            source: WireSource::Node {
                node: 0,
                output: "r_a".to_string(),
            },
        };
        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"input": "r_a", "from": "node", "node": 0, "output": "r_a"})
        );
    }
}
