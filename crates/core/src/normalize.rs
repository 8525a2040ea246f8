//! Payload normalization (C5): folds an agent runtime's loosely-shaped event
//! data into the flat key set clients expect, aliases legacy key names, and
//! classifies event roles/content for the UI-facing notification payload.

use serde_json::{Map, Value};

pub type Payload = Map<String, Value>;

/// Keys copied verbatim from a source map into the destination, first-write
/// wins.
const RECOGNIZED_KEYS: &[&str] = &[
    "delta",
    "content",
    "message",
    "command",
    "text",
    "output",
    "diff",
    "exit_code",
    "tool_name",
    "file",
    "id",
];

/// `(from, to)` aliases applied after recognized keys, also first-write wins
/// against anything already present under `to` (including a value copied in
/// by [`RECOGNIZED_KEYS`]).
const ALIASES: &[(&str, &str)] = &[
    ("call_id", "id"),
    ("item_id", "id"),
    ("file_path", "file"),
    ("path", "file"),
];

/// Merges recognized fields from `src` into `dst`. Never overwrites a key
/// already present in `dst`.
pub fn merge_payload_from_map(dst: &mut Payload, src: &Payload) {
    for key in RECOGNIZED_KEYS {
        if !dst.contains_key(*key) {
            if let Some(v) = src.get(*key) {
                dst.insert((*key).to_string(), v.clone());
            }
        }
    }
    for (from, to) in ALIASES {
        if !dst.contains_key(*to) {
            if let Some(v) = src.get(*from) {
                dst.insert((*to).to_string(), v.clone());
            }
        }
    }
}

/// Parses `raw` as JSON and merges its top-level fields into `dst`, then
/// recurses one level into a nested `msg` object and a nested `data` object
/// (or a `data` string that itself decodes to a JSON object). Invalid JSON,
/// or a JSON value that isn't an object, leaves `dst` unchanged.
pub fn merge_payload_fields(dst: &mut Payload, raw: &[u8]) {
    let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(raw) else {
        return;
    };
    merge_payload_from_map(dst, &obj);
    if let Some(Value::Object(msg)) = obj.get("msg") {
        merge_payload_from_map(dst, msg);
    }
    match obj.get("data") {
        Some(Value::Object(data)) => merge_payload_from_map(dst, data),
        Some(Value::String(s)) => {
            if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(s) {
                merge_payload_from_map(dst, &data);
            }
        }
        _ => {}
    }
}

const CONTENT_KEYS: &[&str] = &[
    "delta", "content", "message", "command", "text", "output", "diff",
];

/// Returns the first non-empty string value among the candidate content
/// keys, in preference order; an empty string if none match.
pub fn extract_event_content(payload: &Payload) -> String {
    for key in CONTENT_KEYS {
        if let Some(s) = payload.get(*key).and_then(Value::as_str) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    String::new()
}

const TOOL_MARKERS: &[&str] = &[
    "exec_",
    "patch_apply",
    "mcp_",
    "dynamic_tool_call",
    "commandExecution/",
    "fileChange/",
    "dynamicTool/",
    "tool/call/",
];
const USER_MARKERS: &[&str] = &["turn_started", "turn/started", "user_message", "item/usermessage"];

/// Classifies an event type into a coarse role for UI grouping. First match
/// wins, in the order assistant, tool, user, system.
pub fn classify_event_role(event_type: &str) -> &'static str {
    if event_type.contains("agent_message") || event_type.contains("reasoning") {
        return "assistant";
    }
    if TOOL_MARKERS.iter().any(|m| event_type.contains(m)) {
        return "tool";
    }
    if USER_MARKERS.iter().any(|m| event_type.contains(m)) {
        return "user";
    }
    "system"
}

/// Normalizes a loosely-shaped "files" field into a deduplicated list of
/// non-empty, trimmed strings, preserving first-seen order.
pub fn normalize_files(raw: &Value) -> Vec<String> {
    let items: Vec<&Value> = match raw {
        Value::String(_) => vec![raw],
        Value::Array(items) => items.iter().collect(),
        _ => return Vec::new(),
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if let Some(s) = item.as_str() {
            let trimmed = s.trim();
            if !trimmed.is_empty() && seen.insert(trimmed.to_string()) {
                out.push(trimmed.to_string());
            }
        }
    }
    out
}

/// Extracts file paths touched by a unified-diff style patch delta, from
/// `diff --git a/X b/X` headers and single-letter status-prefixed lines
/// (`M path`, `A path`, `D path`).
pub fn parse_files_from_patch_delta(delta: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for line in delta.lines() {
        if let Some(rest) = line.strip_prefix("diff --git a/") {
            if let Some((path, _)) = rest.split_once(" b/") {
                if seen.insert(path.to_string()) {
                    out.push(path.to_string());
                }
                continue;
            }
        }
        for prefix in ["M ", "A ", "D "] {
            if let Some(path) = line.strip_prefix(prefix) {
                let path = path.trim();
                if !path.is_empty() && seen.insert(path.to_string()) {
                    out.push(path.to_string());
                }
            }
        }
    }
    out
}

/// Heuristically classifies a raw tool-result string as success/failure.
pub fn tool_result_success(result: &str) -> bool {
    let trimmed = result.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    if lowered.starts_with("error:") || lowered.starts_with("failed") || lowered.contains("unknown tool") {
        return false;
    }
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
        if let Some(err) = obj.get("error").and_then(Value::as_str) {
            if !err.is_empty() {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_never_overwrites_existing_key() {
        let mut dst = Map::new();
        dst.insert("id".into(), json!("kept"));
        let mut src = Map::new();
        src.insert("id".into(), json!("new"));
        src.insert("call_id".into(), json!("also-new"));
        merge_payload_from_map(&mut dst, &src);
        assert_eq!(dst.get("id"), Some(&json!("kept")));
    }

    #[test]
    fn alias_fills_when_absent() {
        let mut dst = Map::new();
        let mut src = Map::new();
        src.insert("call_id".into(), json!("abc"));
        merge_payload_from_map(&mut dst, &src);
        assert_eq!(dst.get("id"), Some(&json!("abc")));
    }

    #[test]
    fn merge_payload_fields_recurses_one_level() {
        let mut dst = Map::new();
        let raw = br#"{"msg": {"command": "ls"}, "data": "{\"output\": \"ok\"}"}"#;
        merge_payload_fields(&mut dst, raw);
        assert_eq!(dst.get("command"), Some(&json!("ls")));
        assert_eq!(dst.get("output"), Some(&json!("ok")));
    }

    #[test]
    fn invalid_json_leaves_dst_unchanged() {
        let mut dst = Map::new();
        dst.insert("id".into(), json!("kept"));
        merge_payload_fields(&mut dst, b"not json");
        assert_eq!(dst.len(), 1);
    }

    #[test]
    fn normalize_files_dedupes_and_trims() {
        let raw = json!([" a.rs ", "b.rs", "a.rs", "", "  "]);
        assert_eq!(normalize_files(&raw), vec!["a.rs".to_string(), "b.rs".to_string()]);
    }

    #[test]
    fn normalize_files_is_idempotent() {
        let raw = json!(["a.rs", "b.rs"]);
        let once = normalize_files(&raw);
        let twice = normalize_files(&Value::Array(once.iter().cloned().map(Value::String).collect()));
        assert_eq!(once, twice);
    }

    #[test]
    fn parse_patch_delta_extracts_paths() {
        let delta = "diff --git a/src/lib.rs b/src/lib.rs\n@@ -1,1 +1,1 @@\nM src/other.rs\n";
        let files = parse_files_from_patch_delta(delta);
        assert_eq!(files, vec!["src/lib.rs".to_string(), "src/other.rs".to_string()]);
    }

    #[test]
    fn tool_result_success_detects_failures() {
        assert!(!tool_result_success("Error: boom"));
        assert!(!tool_result_success("{\"error\": \"bad arg\"}"));
        assert!(tool_result_success(""));
        assert!(tool_result_success("ok"));
    }

    #[test]
    fn extract_event_content_prefers_delta_over_content() {
        let mut payload = Map::new();
        payload.insert("content".into(), json!("fallback"));
        payload.insert("delta".into(), json!("preferred"));
        assert_eq!(extract_event_content(&payload), "preferred");
    }

    #[test]
    fn extract_event_content_empty_when_nothing_matches() {
        let payload = Map::new();
        assert_eq!(extract_event_content(&payload), "");
    }

    #[test]
    fn classify_event_role_precedence() {
        assert_eq!(classify_event_role("agent_message_delta"), "assistant");
        assert_eq!(classify_event_role("exec_command_begin"), "tool");
        assert_eq!(classify_event_role("user_message"), "user");
        assert_eq!(classify_event_role("session_configured"), "system");
    }
}
