//! Trait boundary for the external collaborators the control plane drives
//! but does not own: the agent subprocess runtime, the workspace manager,
//! and the preference/key-value store. Production implementations of these
//! traits live outside this crate; what's here is the contract plus a set
//! of in-memory test doubles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Coarse agent lifecycle state. The set is open-ended on the runtime side
/// (`running`, `idle`, `stuck`, ...); anything this crate doesn't know about
/// round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Running,
    Idle,
    Stuck,
    Other(String),
}

impl AgentState {
    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => AgentState::Running,
            "idle" => AgentState::Idle,
            "stuck" => AgentState::Stuck,
            other => AgentState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AgentState::Running => "running",
            AgentState::Idle => "idle",
            AgentState::Stuck => "stuck",
            AgentState::Other(s) => s,
        }
    }
}

impl Serialize for AgentState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub state: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Pre-minted `agent-<unix-ms>-<sequence>` id. The caller (the
    /// orchestration layer) generates this before calling `launch` so the
    /// id is known even if the manager's own bookkeeping fails; a
    /// well-behaved manager launches the agent under this id rather than
    /// minting its own.
    pub id: String,
    pub name: String,
    pub prompt: Option<String>,
    pub cwd: PathBuf,
    pub workspace_run_key: Option<String>,
    /// Combined dynamic-tool names (LSP + orchestration + resource) the
    /// spawned agent should be handed.
    pub dynamic_tools: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("overloaded")]
    Overloaded,
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("launch timed out")]
    LaunchTimeout,
    #[error("{0}")]
    Other(String),
}

/// A callback the runtime attaches to an approval-bearing event. Unlike the
/// source's bare closures, failures are surfaced as a `Result` so the
/// approval coordinator can log them instead of swallowing a panic.
pub type ApprovalFn = Box<dyn FnOnce() -> Result<(), String> + Send>;
pub type RespondFn = Box<dyn FnOnce(Value) -> Result<(), String> + Send>;

/// One ingested event from an agent subprocess. `data` is the runtime's
/// native event payload, not yet normalized; normalization is the control
/// plane's job.
pub struct AgentEvent {
    pub event_type: String,
    pub data: Value,
    pub approve: Option<ApprovalFn>,
    pub deny: Option<ApprovalFn>,
    pub respond: Option<RespondFn>,
}

impl std::fmt::Debug for AgentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEvent")
            .field("event_type", &self.event_type)
            .field("data", &self.data)
            .field("has_approve", &self.approve.is_some())
            .field("has_deny", &self.deny.is_some())
            .field("has_respond", &self.respond.is_some())
            .finish()
    }
}

/// One event from the runtime's ingest stream, tagged with its origin.
#[derive(Debug)]
pub struct RuntimeEvent {
    pub agent_id: String,
    pub thread_id: Option<String>,
    pub event: AgentEvent,
}

/// The opaque agent subprocess runtime. Production code launches real
/// subprocesses; this crate only commits to the shape of the contract.
#[async_trait]
pub trait AgentManager: Send + Sync {
    async fn launch(&self, spec: LaunchSpec) -> Result<AgentInfo, RuntimeError>;
    async fn stop(&self, agent_id: &str) -> Result<(), RuntimeError>;
    async fn submit(&self, agent_id: &str, message: &str) -> Result<(), RuntimeError>;
    async fn list(&self) -> Vec<AgentInfo>;
}

/// Resolves a `workspace_run_key` to a working directory. Backed in
/// production by the virtual-workspace manager named in the spec's
/// out-of-scope collaborators.
pub trait WorkspaceManager: Send + Sync {
    fn resolve_cwd(&self, workspace_run_key: &str) -> Option<PathBuf>;
}

/// Minimal async key-value store, used for archive bookkeeping and user
/// settings (e.g. the masked `OPENAI_API_KEY`).
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String);
    async fn remove(&self, key: &str);
}

/// In-memory [`AgentManager`] double used by tests and by the demo binary.
pub struct MockAgentManager {
    agents: StdMutex<HashMap<String, AgentInfo>>,
}

impl Default for MockAgentManager {
    fn default() -> Self {
        Self {
            agents: StdMutex::new(HashMap::new()),
        }
    }
}

impl MockAgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, info: AgentInfo) {
        self.agents.lock().unwrap().insert(info.id.clone(), info);
    }
}

#[async_trait]
impl AgentManager for MockAgentManager {
    async fn launch(&self, spec: LaunchSpec) -> Result<AgentInfo, RuntimeError> {
        let info = AgentInfo {
            id: spec.id.clone(),
            name: spec.name,
            state: AgentState::Running,
            port: None,
            thread_id: None,
        };
        self.agents.lock().unwrap().insert(spec.id, info.clone());
        Ok(info)
    }

    async fn stop(&self, agent_id: &str) -> Result<(), RuntimeError> {
        self.agents
            .lock()
            .unwrap()
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(agent_id.to_string()))
    }

    async fn submit(&self, agent_id: &str, _message: &str) -> Result<(), RuntimeError> {
        if self.agents.lock().unwrap().contains_key(agent_id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(agent_id.to_string()))
        }
    }

    async fn list(&self) -> Vec<AgentInfo> {
        self.agents.lock().unwrap().values().cloned().collect()
    }
}

/// In-memory [`WorkspaceManager`] double.
#[derive(Default)]
pub struct MockWorkspaceManager {
    keys: StdMutex<HashMap<String, PathBuf>>,
}

impl MockWorkspaceManager {
    pub fn with_mapping(key: impl Into<String>, path: PathBuf) -> Self {
        let mgr = Self::default();
        mgr.keys.lock().unwrap().insert(key.into(), path);
        mgr
    }
}

impl WorkspaceManager for MockWorkspaceManager {
    fn resolve_cwd(&self, workspace_run_key: &str) -> Option<PathBuf> {
        self.keys.lock().unwrap().get(workspace_run_key).cloned()
    }
}

/// In-memory [`PreferenceStore`] double.
#[derive(Default, Clone)]
pub struct MockPreferenceStore {
    inner: Arc<tokio::sync::Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl PreferenceStore for MockPreferenceStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.inner.lock().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }
}
