//! In-memory stand-ins for the remote collaborators.
//!
//! Every fake records what it was asked to do so tests can assert on the
//! exact sequence of remote calls.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use ruledag::jit::{
    ArtifactStore, ExecutionHandle, ExecutionService, LaunchRequest, RegisterOutcome,
    RegistrationKey, RemoteError, WireWorkflow, WorkflowId, WorkflowRegistry,
};

#[derive(Default)]
struct RegistryState {
    /// key -> (workflow, lookups still answering "not visible")
    registered: BTreeMap<RegistrationKey, (Option<WireWorkflow>, u32)>,
    order: Vec<RegistrationKey>,
    register_calls: u32,
    lookup_calls: u32,
    visibility_delay: u32,
    never_visible: bool,
    register_errors: VecDeque<RemoteError>,
    lookup_errors: VecDeque<RemoteError>,
}

/// Registry that keeps registrations in memory.
///
/// - A second registration of the same key answers `AlreadyExists`.
/// - A registration becomes visible after `visibility_delay` lookups.
/// - Queued errors are returned, in order, before normal behaviour resumes.
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<RegistryState>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookups answer "not visible" this many times per registration.
    pub fn with_visibility_delay(self, lookups: u32) -> Self {
        self.state.lock().unwrap().visibility_delay = lookups;
        self
    }

    pub fn never_visible(self) -> Self {
        self.state.lock().unwrap().never_visible = true;
        self
    }

    /// Pretend `key` was registered by someone else earlier.
    pub fn preregister(self, key: RegistrationKey) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.registered.insert(key.clone(), (None, 0));
            state.order.push(key);
        }
        self
    }

    pub fn fail_register_with(&self, error: RemoteError) {
        self.state.lock().unwrap().register_errors.push_back(error);
    }

    pub fn fail_lookup_with(&self, error: RemoteError) {
        self.state.lock().unwrap().lookup_errors.push_back(error);
    }

    /// Workflows registered through this fake, in registration order.
    pub fn registrations(&self) -> Vec<(RegistrationKey, WireWorkflow)> {
        let state = self.state.lock().unwrap();
        state
            .order
            .iter()
            .filter_map(|key| {
                state
                    .registered
                    .get(key)
                    .and_then(|(wf, _)| wf.clone())
                    .map(|wf| (key.clone(), wf))
            })
            .collect()
    }

    pub fn register_calls(&self) -> u32 {
        self.state.lock().unwrap().register_calls
    }

    pub fn lookup_calls(&self) -> u32 {
        self.state.lock().unwrap().lookup_calls
    }
}

#[async_trait]
impl WorkflowRegistry for FakeRegistry {
    async fn register(
        &self,
        key: &RegistrationKey,
        workflow: &WireWorkflow,
    ) -> Result<RegisterOutcome, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.register_calls += 1;
        if let Some(err) = state.register_errors.pop_front() {
            return Err(err);
        }
        if state.registered.contains_key(key) {
            return Ok(RegisterOutcome::AlreadyExists(format!(
                "workflow {key} is already registered"
            )));
        }
        let delay = state.visibility_delay;
        state
            .registered
            .insert(key.clone(), (Some(workflow.clone()), delay));
        state.order.push(key.clone());
        Ok(RegisterOutcome::Registered)
    }

    async fn lookup(&self, key: &RegistrationKey) -> Result<Option<WorkflowId>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.lookup_calls += 1;
        if let Some(err) = state.lookup_errors.pop_front() {
            return Err(err);
        }
        let never_visible = state.never_visible;
        match state.registered.get_mut(key) {
            None => Ok(None),
            Some(_) if never_visible => Ok(None),
            Some((_, hidden)) if *hidden > 0 => {
                *hidden -= 1;
                Ok(None)
            }
            Some(_) => Ok(Some(WorkflowId(format!("wf:{}:{}", key.name, key.version)))),
        }
    }
}

#[derive(Default)]
struct ExecutorState {
    launches: Vec<LaunchRequest>,
    errors: VecDeque<RemoteError>,
}

/// Execution service that records launch requests.
#[derive(Default)]
pub struct FakeExecutionService {
    state: Mutex<ExecutorState>,
}

impl FakeExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_launch_with(&self, error: RemoteError) {
        self.state.lock().unwrap().errors.push_back(error);
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launches.clone()
    }
}

#[async_trait]
impl ExecutionService for FakeExecutionService {
    async fn launch(&self, request: &LaunchRequest) -> Result<ExecutionHandle, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.errors.pop_front() {
            return Err(err);
        }
        state.launches.push(request.clone());
        Ok(ExecutionHandle {
            id: format!("exec-{}", state.launches.len()),
        })
    }
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, Vec<u8>>,
    puts: u32,
    errors: VecDeque<RemoteError>,
}

/// Artifact store backed by a map.
#[derive(Default)]
pub struct FakeArtifactStore {
    state: Mutex<StoreState>,
}

impl FakeArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_put_with(&self, error: RemoteError) {
        self.state.lock().unwrap().errors.push_back(error);
    }

    pub fn get(&self, location: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(location).cloned()
    }

    pub fn locations(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn put_calls(&self) -> u32 {
        self.state.lock().unwrap().puts
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn put(&self, location: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.puts += 1;
        if let Some(err) = state.errors.pop_front() {
            return Err(err);
        }
        state.objects.insert(location.to_string(), bytes);
        Ok(())
    }
}
