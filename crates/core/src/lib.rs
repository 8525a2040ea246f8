//! Dispatch core for the local multi-agent control plane: a bidirectional
//! JSON-RPC 2.0 surface in front of an opaque agent subprocess runtime.
//!
//! This crate owns everything the wire protocol (`acp-protocol`) and the
//! runtime boundary (`acp-runtime`) don't: method registration and offline
//! filtering, event-to-notification translation and payload normalization,
//! connection bookkeeping, turn tracking, approval coordination, the
//! orchestration tool surface, thread archiving, and the dynamic tool
//! registry. [`ControlPlane`] assembles all of it into the one object a
//! transport binary needs to drive.

pub mod approval;
pub mod archive;
pub mod connections;
pub mod cors;
pub mod dispatch;
pub mod event_map;
pub mod handler;
pub mod limiting;
pub mod methods;
pub mod normalize;
pub mod orchestration;
pub mod registry;
pub mod tools;
pub mod turn_tracker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use acp_runtime::{AgentManager, PreferenceStore, WorkspaceManager};

use crate::archive::ThreadArchiver;
use crate::connections::ConnectionRegistry;
use crate::dispatch::Dispatcher;
use crate::methods::MethodContext;
use crate::orchestration::OrchestrationTools;
use crate::tools::{DynamicToolRegistry, ProviderRegistration};
use crate::turn_tracker::TurnTracker;

const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ControlPlaneConfig {
    pub offline: bool,
    pub home_dir: PathBuf,
    pub watchdog_timeout: Duration,
    pub approval_timeout: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            offline: false,
            home_dir: std::env::temp_dir(),
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }
}

/// Assembles the dispatch core, its collaborators, and the dynamic tool
/// registry behind one handle a transport can drive.
pub struct ControlPlane {
    pub dispatcher: Arc<Dispatcher>,
    pub dynamic_tools: Arc<DynamicToolRegistry>,
}

impl ControlPlane {
    pub fn new(
        config: ControlPlaneConfig,
        agent_manager: Arc<dyn AgentManager>,
        workspace: Arc<dyn WorkspaceManager>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let turn_tracker = TurnTracker::new(config.watchdog_timeout);
        let approval = approval::ApprovalCoordinator::new(config.approval_timeout);
        let archiver = Arc::new(ThreadArchiver::new(config.home_dir, prefs.clone()));

        let dynamic_tools = Arc::new(DynamicToolRegistry::new());
        dynamic_tools.register(ProviderRegistration {
            name: "orchestration".into(),
            install: Arc::new(|| {}),
            build: Arc::new(orchestration::tool_descriptors),
        });
        dynamic_tools.install_all();

        let orchestration = Arc::new(OrchestrationTools::new(
            agent_manager,
            workspace,
            prefs,
            dynamic_tools
                .build_tools()
                .into_iter()
                .map(|t| t.name)
                .collect(),
        ));

        let method_ctx = Arc::new(MethodContext {
            turn_tracker: turn_tracker.clone(),
            archiver,
            orchestration: orchestration.clone(),
        });
        let registry = methods::build_registry(config.offline, method_ctx);

        let dispatcher = Dispatcher::new(registry, connections, turn_tracker, approval, orchestration);

        Self {
            dispatcher,
            dynamic_tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_runtime::{MockAgentManager, MockPreferenceStore, MockWorkspaceManager};

    #[tokio::test]
    async fn control_plane_wires_up_and_routes_a_known_method() {
        let plane = ControlPlane::new(
            ControlPlaneConfig {
                offline: true,
                ..Default::default()
            },
            Arc::new(MockAgentManager::new()),
            Arc::new(MockWorkspaceManager::default()),
            Arc::new(MockPreferenceStore::default()),
        );
        let frame = br#"{"jsonrpc":"2.0","id":1,"method":"thread/interrupt","params":{"threadId":"t1"}}"#;
        let reply = plane.dispatcher.handle_inbound("c1", frame).await.unwrap();
        let v = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["result"]["acknowledged"], serde_json::json!(false));
    }
}
