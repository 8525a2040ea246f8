//! Event-to-method mapping (C4): translates an agent runtime's native event
//! type into the notification method name broadcast to connected clients.
//! Unmapped event types fall back to `agent/event/<type>` and log a warning
//! so an unrecognized upstream event type is visible without breaking the
//! broadcast path.

pub fn map_event_to_method(event_type: &str) -> String {
    match event_type {
        "session_configured" => "thread/started".to_string(),
        "turn_started" => "turn/started".to_string(),
        "turn_complete" | "idle" => "turn/completed".to_string(),
        "turn_aborted" => "turn/completed".to_string(),
        "agent_message" | "exec_command_begin" => "item/started".to_string(),
        "agent_message_delta" => "item/agentMessage/delta".to_string(),
        "exec_command_end" => "item/completed".to_string(),
        "patch_apply_begin" => "item/fileChange/started".to_string(),
        "patch_apply_end" => "item/fileChange/completed".to_string(),
        "error" | "stream_error" => "error".to_string(),
        "warning" => "configWarning".to_string(),
        other => {
            tracing::warn!(event_type = other, "unmapped agent event type");
            format!("agent/event/{other}")
        }
    }
}
