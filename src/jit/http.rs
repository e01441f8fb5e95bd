// src/jit/http.rs

//! `reqwest` clients for the registry, execution and artifact services.
//!
//! Status mapping: 2xx success, 409 already exists (registration only),
//! 401/403 unauthorized, other 4xx rejected, 5xx and transport errors
//! transient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::jit::remote::{
    ArtifactStore, ExecutionHandle, ExecutionService, LaunchRequest, RegisterOutcome,
    RegistrationKey, WorkflowId, WorkflowRegistry,
};
use crate::jit::wire::WireWorkflow;
use crate::jit::RemoteError;

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RemoteError::Transient(e.to_string()))
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Transient(err.to_string())
}

/// Map a non-success status and its body to a [`RemoteError`].
pub fn classify(status: StatusCode, body: String) -> RemoteError {
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        s if s.is_server_error() => RemoteError::Transient(message),
        s => RemoteError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify(status, body))
}

/// Registry and execution service sharing one base URL.
pub struct HttpRegistry {
    client: reqwest::Client,
    base: String,
}

impl HttpRegistry {
    pub fn new(base: impl Into<String>, timeout_secs: u64) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    fn workflow_url(&self, key: &RegistrationKey) -> String {
        format!(
            "{}/workflows/{}/{}/{}",
            self.base, key.owner, key.name, key.version
        )
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    id: String,
}

#[async_trait]
impl WorkflowRegistry for HttpRegistry {
    async fn register(
        &self,
        key: &RegistrationKey,
        workflow: &WireWorkflow,
    ) -> Result<RegisterOutcome, RemoteError> {
        debug!(%key, "POST workflow registration");
        let response = self
            .client
            .post(format!("{}/workflows", self.base))
            .json(workflow)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Ok(RegisterOutcome::AlreadyExists(body));
        }
        check(response).await?;
        Ok(RegisterOutcome::Registered)
    }

    async fn lookup(&self, key: &RegistrationKey) -> Result<Option<WorkflowId>, RemoteError> {
        let response = self
            .client
            .get(self.workflow_url(key))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: LookupResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(Some(WorkflowId(found.id)))
    }
}

#[async_trait]
impl ExecutionService for HttpRegistry {
    async fn launch(&self, request: &LaunchRequest) -> Result<ExecutionHandle, RemoteError> {
        debug!(workflow = %request.workflow_id, "POST launch");
        let response = self
            .client
            .post(format!("{}/executions", self.base))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }
}

/// Artifact store accepting `PUT <base>/<location>`.
pub struct HttpArtifactStore {
    client: reqwest::Client,
    base: String,
}

impl HttpArtifactStore {
    pub fn new(base: impl Into<String>, timeout_secs: u64) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn put(&self, location: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let url = format!("{}/{}", self.base, location.trim_start_matches('/'));
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }
}
