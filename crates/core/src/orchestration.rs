//! Orchestration tools (C9): `list_agents`/`send_message`/`launch_agent`/
//! `stop_agent`, exposed to running agents as dynamic tool calls so one
//! agent can spawn and coordinate others, plus the command-exec sandboxing
//! helpers used by the `command/exec` method.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use acp_runtime::{AgentManager, LaunchSpec, PreferenceStore, WorkspaceManager};
use serde_json::{Value, json};

use crate::limiting::LimitedWriter;
use crate::tools::ToolDescriptor;

const MAX_AGENTS: usize = 20;
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OrchestrationTools {
    agent_manager: std::sync::Arc<dyn AgentManager>,
    workspace: std::sync::Arc<dyn WorkspaceManager>,
    prefs: std::sync::Arc<dyn PreferenceStore>,
    dynamic_tool_names: Vec<String>,
    agent_sequence: AtomicU64,
}

fn success_json(value: Value) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string())
}

fn error_json(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// The four orchestration verbs as they're announced to agents on the
/// dynamic tool surface (C11). Schemas are intentionally loose: the
/// handlers below validate the fields they actually need.
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "list_agents".into(),
            description: "List currently running agents.".into(),
            schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescriptor {
            name: "send_message".into(),
            description: "Send a message to another running agent.".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string"},
                    "message": {"type": "string"},
                },
                "required": ["agent_id", "message"],
            }),
        },
        ToolDescriptor {
            name: "launch_agent".into(),
            description: "Launch a new agent subprocess.".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "prompt": {"type": "string"},
                    "cwd": {"type": "string"},
                    "workspace_run_key": {"type": "string"},
                },
                "required": ["name"],
            }),
        },
        ToolDescriptor {
            name: "stop_agent".into(),
            description: "Stop a running agent.".into(),
            schema: json!({
                "type": "object",
                "properties": {"agent_id": {"type": "string"}},
                "required": ["agent_id"],
            }),
        },
    ]
}

impl OrchestrationTools {
    pub fn new(
        agent_manager: std::sync::Arc<dyn AgentManager>,
        workspace: std::sync::Arc<dyn WorkspaceManager>,
        prefs: std::sync::Arc<dyn PreferenceStore>,
        dynamic_tool_names: Vec<String>,
    ) -> Self {
        Self {
            agent_manager,
            workspace,
            prefs,
            dynamic_tool_names,
            agent_sequence: AtomicU64::new(0),
        }
    }

    /// Dispatches one dynamic tool call by name. Unknown names return an
    /// error payload rather than panicking, since the name comes straight
    /// off the wire from an agent.
    pub async fn invoke_tool(&self, tool_name: &str, sender_agent_id: &str, args: &Value) -> String {
        match tool_name {
            "list_agents" => self.list_agents().await,
            "send_message" => {
                let agent_id = args.get("agent_id").and_then(Value::as_str).unwrap_or_default();
                let message = args.get("message").and_then(Value::as_str).unwrap_or_default();
                self.send_message(sender_agent_id, agent_id, message).await
            }
            "launch_agent" => {
                let name = args.get("name").and_then(Value::as_str).unwrap_or_default();
                let prompt = args.get("prompt").and_then(Value::as_str).map(str::to_string);
                let cwd = args.get("cwd").and_then(Value::as_str).map(str::to_string);
                let workspace_run_key = args
                    .get("workspace_run_key")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.launch_agent(name, prompt, cwd, workspace_run_key).await
            }
            "stop_agent" => {
                let agent_id = args.get("agent_id").and_then(Value::as_str).unwrap_or_default();
                self.stop_agent(agent_id).await
            }
            other => error_json(&format!("unknown tool: {other}")),
        }
    }

    pub async fn list_agents(&self) -> String {
        let agents = self.agent_manager.list().await;
        serde_json::to_string(&agents).unwrap_or_else(|_| "[]".to_string())
    }

    pub async fn send_message(&self, sender_agent_id: &str, agent_id: &str, message: &str) -> String {
        if agent_id.is_empty() || message.is_empty() {
            return error_json("agent_id and message are required");
        }
        match self.agent_manager.submit(agent_id, message).await {
            Ok(()) => {
                tracing::info!(
                    target: "orchestration",
                    sender_agent_id,
                    agent_id,
                    message_len = message.len(),
                    "forwarded message to agent"
                );
                self.prefs
                    .set(
                        &format!("report-requested:{sender_agent_id}:{agent_id}"),
                        "true".to_string(),
                    )
                    .await;
                success_json(json!({"status": "sent"}))
            }
            Err(e) => error_json(&e.to_string()),
        }
    }

    fn mint_agent_id(&self) -> String {
        let unix_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.agent_sequence.fetch_add(1, Ordering::SeqCst);
        format!("agent-{unix_ms}-{seq}")
    }

    pub async fn launch_agent(
        &self,
        name: &str,
        prompt: Option<String>,
        cwd: Option<String>,
        workspace_run_key: Option<String>,
    ) -> String {
        if name.is_empty() {
            return error_json("name is required");
        }
        let active = self.agent_manager.list().await.len();
        if active >= MAX_AGENTS {
            return error_json(&format!("max agents ({MAX_AGENTS}) reached"));
        }

        let resolved_cwd = workspace_run_key
            .as_deref()
            .and_then(|key| self.workspace.resolve_cwd(key))
            .or_else(|| cwd.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let agent_id = self.mint_agent_id();
        let spec = LaunchSpec {
            id: agent_id.clone(),
            name: name.to_string(),
            prompt,
            cwd: resolved_cwd.clone(),
            workspace_run_key: workspace_run_key.clone(),
            dynamic_tools: self.dynamic_tool_names.clone(),
        };

        match tokio::time::timeout(LAUNCH_TIMEOUT, self.agent_manager.launch(spec)).await {
            Ok(Ok(info)) => success_json(json!({
                "agent_id": info.id,
                "name": info.name,
                "status": "running",
                "cwd": resolved_cwd,
                "workspace_run_key": workspace_run_key,
            })),
            Ok(Err(e)) => error_json(&e.to_string()),
            Err(_) => error_json("launch timed out after 30s"),
        }
    }

    pub async fn stop_agent(&self, agent_id: &str) -> String {
        if agent_id.is_empty() {
            return error_json("agent_id is required");
        }
        match self.agent_manager.stop(agent_id).await {
            Ok(()) => {
                self.prefs.remove(&format!("codex-thread:{agent_id}")).await;
                success_json(json!({"status": "stopped"}))
            }
            Err(e) => error_json(&e.to_string()),
        }
    }
}

const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "sudo", "curl", "wget", "dd", "mount", "umount", "shutdown", "reboot", "mkfs", "kill",
    "killall",
];
const SHELL_METACHARACTERS: &[char] = &['|', ';', '&', '$', '`'];
const ENV_ALLOW_PREFIXES: &[&str] = &["OPENAI_", "CODEX_", "MCP_"];
const ENV_ALLOW_EXACT: &[&str] = &["LOG_LEVEL", "AGENT_MODE", "APP_PORT"];
const EXEC_TIMEOUT: Duration = Duration::from_secs(30);
const OUTPUT_CAP: usize = 1 << 20;

pub struct ExecRequest {
    pub argv: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `req` under a restrictive sandbox: blocklisted binaries and any
/// argument carrying a shell metacharacter are rejected before spawning,
/// only allow-listed environment variables are forwarded to the child, and
/// the call is bounded by a 30s timeout with output capped at 1 MiB per
/// stream.
pub async fn command_exec(req: ExecRequest) -> Result<ExecResult, String> {
    let Some(program) = req.argv.first() else {
        return Err("Server.commandExec: empty argv".to_string());
    };
    let base_name = std::path::Path::new(program)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(program);
    if BLOCKED_COMMANDS.contains(&base_name) {
        return Err(format!(
            "Server.commandExec: command \"{base_name}\" is blocked for security"
        ));
    }
    for arg in &req.argv {
        if arg.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
            return Err(format!(
                "Server.commandExec: argument \"{arg}\" contains shell metacharacters"
            ));
        }
    }

    let filtered_env: Vec<(String, String)> = req
        .env
        .into_iter()
        .filter(|(k, _)| {
            ENV_ALLOW_EXACT.contains(&k.as_str()) || ENV_ALLOW_PREFIXES.iter().any(|p| k.starts_with(p))
        })
        .collect();

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(&req.argv[1..]);
    cmd.env_clear();
    for (k, v) in filtered_env {
        cmd.env(k, v);
    }
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let child = cmd
        .spawn()
        .map_err(|e| format!("Server.commandExec: failed to spawn: {e}"))?;

    let output = tokio::time::timeout(EXEC_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| "Server.commandExec: timed out after 30s".to_string())?
        .map_err(|e| format!("Server.commandExec: {e}"))?;

    let mut stdout_writer = LimitedWriter::new(OUTPUT_CAP);
    stdout_writer.write(&output.stdout);
    let mut stderr_writer = LimitedWriter::new(OUTPUT_CAP);
    stderr_writer.write(&output.stderr);

    Ok(ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout_writer.into_inner()).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_writer.into_inner()).into_owned(),
    })
}
