// src/jit/artifacts.rs

//! Entrypoint artifacts: naming, packaging and a filesystem-backed store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::compile::{CompiledGraph, NodeId};
use crate::config::model::ConfigSection;
use crate::entrypoint::{generate, render_script};
use crate::fs::FileSystem;
use crate::ident::encode;
use crate::jit::remote::{ArtifactStore, RegistrationKey};
use crate::jit::wire::ArtifactRef;
use crate::jit::{JitError, RemoteError};

/// Hex digits of the content digest kept in an artifact location.
const LOCATION_DIGEST_CHARS: usize = 16;

/// Content-addressed location of an entrypoint:
/// `<prefix>/<owner>/<workflow>/<version>/<task>-<digest>.sh`.
///
/// Different content never lands on the same location, so an upload can not
/// replace a script an earlier registration already references.
pub fn artifact_location(
    prefix: &str,
    key: &RegistrationKey,
    task_name: &str,
    digest: &str,
) -> String {
    let short = digest.get(..LOCATION_DIGEST_CHARS).unwrap_or(digest);
    let relative = format!(
        "{}/{}/{}/{task_name}-{short}.sh",
        encode(&key.owner),
        key.name,
        key.version
    );
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Reference for `bytes` uploaded as the entrypoint of `task_name`.
pub fn artifact_ref(
    prefix: &str,
    key: &RegistrationKey,
    task_name: &str,
    bytes: &[u8],
) -> ArtifactRef {
    let digest = blake3::hash(bytes).to_hex().to_string();
    ArtifactRef {
        location: artifact_location(prefix, key, task_name, &digest),
        digest,
        size: bytes.len() as u64,
    }
}

/// A rendered entrypoint ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub node: NodeId,
    pub reference: ArtifactRef,
    pub bytes: Vec<u8>,
}

/// Generate and render every node's entrypoint and compute its reference.
pub fn package_entrypoints(
    graph: &CompiledGraph,
    key: &RegistrationKey,
    config: &ConfigSection,
) -> Result<BTreeMap<NodeId, PackagedArtifact>, JitError> {
    let mut packaged = BTreeMap::new();
    for (node, desc) in generate(graph) {
        let script =
            render_script(&desc, &config.transfer).map_err(|e| JitError::Render(format!("{e:#}")))?;
        let bytes = script.into_bytes();
        let reference = artifact_ref(&config.artifact_prefix, key, &desc.name, &bytes);
        debug!(node, location = %reference.location, size = bytes.len(), "packaged entrypoint");
        packaged.insert(
            node,
            PackagedArtifact {
                node,
                reference,
                bytes,
            },
        );
    }
    Ok(packaged)
}

/// Artifact store writing below a local directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn path_for(&self, location: &str) -> PathBuf {
        self.root.join(location.trim_start_matches('/'))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, location: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        if location.split('/').any(|segment| segment == "..") {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!("artifact location {location} escapes the store"),
            });
        }
        let path = self.path_for(location);
        self.fs
            .write(&path, &bytes)
            .map_err(|e| RemoteError::Transient(format!("{e:#}")))
    }
}
