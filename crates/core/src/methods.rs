//! Glue layer: builds the method registry for a given offline/online mode,
//! wiring the handful of methods with real behavior to their collaborators
//! and filling the rest of the public surface with [`noop_handler`], mirroring
//! how a protocol surface grows ahead of its implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::archive::ThreadArchiver;
use crate::handler::{HandlerError, RequestContext, noop_handler, typed};
use crate::orchestration::{self, ExecRequest, OrchestrationTools};
use crate::registry::{self, MethodRegistry};
use crate::turn_tracker::TurnTracker;

pub struct MethodContext {
    pub turn_tracker: Arc<TurnTracker>,
    pub archiver: Arc<ThreadArchiver>,
    pub orchestration: Arc<OrchestrationTools>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadIdParams {
    #[serde(rename = "threadId", default)]
    thread_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ArchiveParams {
    #[serde(rename = "threadId", default)]
    thread_id: String,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CommandExecParams {
    #[serde(default)]
    argv: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ExecResponse {
    #[serde(rename = "exitCode")]
    exit_code: i32,
    stdout: String,
    stderr: String,
}

pub fn build_registry(offline: bool, ctx: Arc<MethodContext>) -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    for name in registry::method_names_for_mode(offline) {
        registry.register(name, noop_handler());
    }

    {
        let tracker = ctx.turn_tracker.clone();
        registry.register(
            "thread/interrupt",
            typed(move |_ctx: RequestContext, p: ThreadIdParams| {
                let tracker = tracker.clone();
                async move {
                    let found = tracker.mark_interrupt_requested(&p.thread_id).await;
                    Ok(json!({"acknowledged": found}))
                }
            }),
        );
    }

    {
        let archiver = ctx.archiver.clone();
        registry.register(
            "thread/archive",
            typed(move |_ctx: RequestContext, p: ArchiveParams| {
                let archiver = archiver.clone();
                async move {
                    let files: Vec<std::path::PathBuf> = p.files.into_iter().map(std::path::PathBuf::from).collect();
                    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.fZ").to_string();
                    archiver
                        .archive(&p.thread_id, &files, &timestamp)
                        .await
                        .map(|manifest| {
                            json!({"threadId": manifest.thread_id, "entryCount": manifest.entries.len()})
                        })
                        .map_err(|e| HandlerError::internal(e.to_string()))
                }
            }),
        );
    }

    {
        let archiver = ctx.archiver.clone();
        registry.register(
            "thread/unarchive",
            typed(move |_ctx: RequestContext, p: ThreadIdParams| {
                let archiver = archiver.clone();
                async move {
                    archiver
                        .unarchive(&p.thread_id)
                        .await
                        .map(|outcome| {
                            json!({
                                "archiveModified": outcome.archive_modified,
                                "modifiedFiles": outcome.modified_files,
                            })
                        })
                        .map_err(|e| HandlerError::internal(e.to_string()))
                }
            }),
        );
    }

    registry.register(
        "command/exec",
        typed(move |_ctx: RequestContext, p: CommandExecParams| async move {
            let result = orchestration::command_exec(ExecRequest {
                argv: p.argv,
                env: p.env,
            })
            .await
            .map_err(HandlerError::internal)?;
            Ok(ExecResponse {
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            })
        }),
    );

    {
        let orch = ctx.orchestration.clone();
        registry.register(
            "agent/list",
            typed(move |_ctx: RequestContext, _p: ()| {
                let orch = orch.clone();
                async move {
                    let raw = orch.list_agents().await;
                    serde_json::from_str::<serde_json::Value>(&raw)
                        .map_err(|e| HandlerError::internal(e.to_string()))
                }
            }),
        );
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ThreadArchiver;
    use acp_runtime::{MockAgentManager, MockPreferenceStore, MockWorkspaceManager};
    use std::time::Duration;

    fn context() -> Arc<MethodContext> {
        Arc::new(MethodContext {
            turn_tracker: TurnTracker::new(Duration::from_secs(60)),
            archiver: Arc::new(ThreadArchiver::new(
                std::env::temp_dir(),
                Arc::new(MockPreferenceStore::default()),
            )),
            orchestration: Arc::new(OrchestrationTools::new(
                Arc::new(MockAgentManager::new()),
                Arc::new(MockWorkspaceManager::default()),
                Arc::new(MockPreferenceStore::default()),
                vec![],
            )),
        })
    }

    #[test]
    fn offline_registry_includes_compact_start_and_excludes_login() {
        let registry = build_registry(true, context());
        assert!(registry.contains("thread/compact/start"));
        assert!(!registry.contains("account/login/start"));
    }

    #[test]
    fn online_registry_includes_login() {
        let registry = build_registry(false, context());
        assert!(registry.contains("account/login/start"));
    }

    #[tokio::test]
    async fn thread_interrupt_reports_whether_a_turn_was_running() {
        let ctx = context();
        let registry = build_registry(true, ctx.clone());
        let handler = registry.get("thread/interrupt").unwrap();
        let req_ctx = RequestContext {
            connection_id: "c1".into(),
        };
        let result = handler(req_ctx, json!({"threadId": "t1"})).await.unwrap();
        assert_eq!(result["acknowledged"], json!(false));

        ctx.turn_tracker.begin("t1", "turn-1".to_string()).await;
        let registry = build_registry(true, ctx.clone());
        let handler = registry.get("thread/interrupt").unwrap();
        let req_ctx = RequestContext {
            connection_id: "c1".into(),
        };
        let result = handler(req_ctx, json!({"threadId": "t1"})).await.unwrap();
        assert_eq!(result["acknowledged"], json!(true));
    }
}
