//! Dispatch core (C10): wires the method registry, connection registry,
//! turn tracker and approval coordinator together. Owns the two entry
//! points a transport drives: inbound client frames, and ingested agent
//! runtime events.

use std::sync::Arc;

use acp_protocol::{DecodeError, error_codes};
use acp_runtime::RuntimeEvent;
use serde_json::{Value, json};

use crate::approval::ApprovalCoordinator;
use crate::connections::ConnectionRegistry;
use crate::event_map::map_event_to_method;
use crate::handler::{HandlerErrorKind, RequestContext};
use crate::normalize::{self, Payload};
use crate::orchestration::OrchestrationTools;
use crate::registry::MethodRegistry;
use crate::turn_tracker::TurnTracker;

pub struct Dispatcher {
    pub registry: MethodRegistry,
    pub connections: Arc<ConnectionRegistry>,
    pub turn_tracker: Arc<TurnTracker>,
    pub approval: Arc<ApprovalCoordinator>,
    pub orchestration: Arc<OrchestrationTools>,
}

impl Dispatcher {
    pub fn new(
        registry: MethodRegistry,
        connections: Arc<ConnectionRegistry>,
        turn_tracker: Arc<TurnTracker>,
        approval: Arc<ApprovalCoordinator>,
        orchestration: Arc<OrchestrationTools>,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            registry,
            connections,
            turn_tracker,
            approval,
            orchestration,
        });
        let connections_for_hook = dispatcher.connections.clone();
        dispatcher
            .turn_tracker
            .set_notify_hook(Arc::new(move |method, params| {
                let connections = connections_for_hook.clone();
                tokio::spawn(async move {
                    connections.broadcast(&method, params).await;
                });
            }));
        dispatcher
    }

    /// Decodes and routes one inbound client frame, returning the outbound
    /// message to send back (if any — notifications never reply, and a
    /// successfully routed frame with `id == None` also never replies).
    pub async fn handle_inbound(
        &self,
        connection_id: &str,
        bytes: &[u8],
    ) -> Option<acp_protocol::OutboundMessage> {
        let frame = match acp_protocol::decode_frame(bytes) {
            Ok(frame) => frame,
            Err(DecodeError::Parse(msg)) => {
                return Some(acp_protocol::error_response(
                    None,
                    error_codes::PARSE_ERROR,
                    msg,
                ));
            }
            Err(DecodeError::InvalidRequest(msg)) => {
                return Some(acp_protocol::error_response(
                    None,
                    error_codes::INVALID_REQUEST,
                    msg,
                ));
            }
        };

        let Some(handler) = self.registry.get(&frame.method) else {
            return frame.id.map(|id| {
                acp_protocol::error_response(
                    Some(id),
                    error_codes::METHOD_NOT_FOUND,
                    format!("method not found: {}", frame.method),
                )
            });
        };

        let ctx = RequestContext {
            connection_id: connection_id.to_string(),
        };
        let result = (handler)(ctx, frame.params).await;

        match (frame.id, result) {
            (None, _) => None,
            (Some(id), Ok(value)) => Some(acp_protocol::response(id, value)),
            (Some(id), Err(e)) => {
                let code = match e.kind {
                    HandlerErrorKind::InvalidParams => error_codes::INVALID_PARAMS,
                    HandlerErrorKind::Overloaded => error_codes::OVERLOADED,
                    HandlerErrorKind::Internal => error_codes::INTERNAL_ERROR,
                };
                Some(acp_protocol::error_response(Some(id), code, e.message))
            }
        }
    }

    /// Ingests one runtime event: maps it to a notification method,
    /// normalizes its payload, routes approval-bearing events through the
    /// approval coordinator instead of broadcasting them, updates turn
    /// tracking state, and broadcasts the result to connected clients.
    pub async fn handle_runtime_event(&self, event: RuntimeEvent) {
        if event.event.event_type == "dynamic_tool_call" {
            self.dispatch_dynamic_tool_call(&event.agent_id, event.event).await;
            return;
        }

        let method = map_event_to_method(&event.event.event_type);
        let ui_type = method.rsplit('/').next().unwrap_or(&method).to_string();

        // threadId is dispatch's own bookkeeping, not part of the agent's
        // native payload, so it's seeded unconditionally. uiType is left
        // unseeded until after the replay guard below: the guard needs to
        // see whether the agent's *own* event data already carried a
        // uiType (meaning the terminal transition is already being
        // observed directly) before dispatch stamps its own.
        let mut payload = Payload::new();
        if let Some(thread_id) = &event.thread_id {
            payload.insert("threadId".into(), json!(thread_id));
        }
        if let Ok(raw) = serde_json::to_vec(&event.event.data) {
            normalize::merge_payload_fields(&mut payload, &raw);
        }

        let is_approval = event.event.approve.is_some() || event.event.deny.is_some();
        if is_approval {
            let broker = self.connections.first().await;
            self.approval
                .handle_approval_request(&event.agent_id, &method, broker, event.event)
                .await;
            return;
        }

        if let Some(thread_id) = &event.thread_id {
            match event.event.event_type.as_str() {
                "turn_started" => {
                    let turn_id = payload
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    self.turn_tracker.begin(thread_id, turn_id).await;
                }
                "turn_complete" | "idle" => {
                    let (final_status, _) = self.turn_tracker.complete(thread_id, "completed").await;
                    payload.insert("status".into(), json!(final_status));
                }
                _ => {
                    let synthesized = self
                        .turn_tracker
                        .maybe_finalize(thread_id, &event.event.event_type, &mut payload)
                        .await;
                    if synthesized {
                        return;
                    }
                }
            }
        }

        payload.entry("uiType".to_string()).or_insert_with(|| json!(ui_type));
        self.connections.broadcast(&method, Value::Object(payload)).await;
    }

    /// Routes one `dynamic_tool_call` event to the orchestration tool
    /// surface: `data` carries `{tool, args}`, the caller is `agent_id`, and
    /// the result is handed back through the event's own `respond`
    /// callback rather than broadcast — this is a tool call, not a client
    /// notification.
    async fn dispatch_dynamic_tool_call(&self, agent_id: &str, event: acp_runtime::AgentEvent) {
        let tool_name = event
            .data
            .get("tool")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = event.data.get("args").cloned().unwrap_or_else(|| json!({}));
        let raw = self.orchestration.invoke_tool(&tool_name, agent_id, &args).await;

        let Some(respond) = event.respond else {
            return;
        };
        let value: Value =
            serde_json::from_str(&raw).unwrap_or_else(|_| json!({"error": "failed to encode tool result"}));
        if let Err(e) = respond(value) {
            tracing::warn!(agent_id, tool = %tool_name, error = %e, "dynamic tool call respond callback failed");
        }
    }
}
