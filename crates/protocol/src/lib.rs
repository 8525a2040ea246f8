//! JSON-RPC 2.0 wire types for the control plane.
//!
//! This crate owns nothing but the shapes on the wire: decoding an inbound
//! frame into a request/notification, and building the four outbound shapes
//! (response, error response, notification, server-initiated request). No
//! dispatch, no handler logic lives here.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes, plus the one extension this system uses
/// for backpressure from the agent runtime.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const OVERLOADED: i64 = -32001;
}

/// A JSON-RPC id. Only integers and strings are modeled; anything else
/// encountered on the wire is treated as an invalid request rather than
/// silently coerced, since `id` must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// `true` iff `raw` is a JSON integer literal; mirrors `parseIntID`.
pub fn parse_int_id(raw: &Value) -> Option<i64> {
    raw.as_i64()
}

/// Preserve a JSON-RPC id verbatim as either an integer or a string;
/// anything else (float, bool, object, array, null) maps to `None`.
pub fn raw_id_to_any(raw: &Value) -> Option<RequestId> {
    if let Some(n) = raw.as_i64() {
        return Some(RequestId::Number(n));
    }
    if let Some(s) = raw.as_str() {
        return Some(RequestId::String(s.to_string()));
    }
    None
}

/// A decoded inbound frame. `id == None` means the frame is a notification
/// and must never receive a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Decode one inbound JSON-RPC frame. Malformed JSON surfaces as
/// [`DecodeError::Parse`] (maps to `-32700`); a well-formed object with a
/// missing/empty method, or an id of an unsupported type, surfaces as
/// [`DecodeError::InvalidRequest`] (maps to `-32600`).
pub fn decode_frame(bytes: &[u8]) -> Result<InboundFrame, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::InvalidRequest("frame is not a JSON object".to_string()))?;

    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return Err(DecodeError::InvalidRequest("missing or empty method".to_string())),
    };

    let id = match obj.get("id") {
        None => None,
        Some(Value::Null) => None,
        Some(other) => match raw_id_to_any(other) {
            Some(id) => Some(id),
            None => {
                return Err(DecodeError::InvalidRequest(
                    "id must be an integer or a string".to_string(),
                ));
            }
        },
    };

    let params = obj.get("params").cloned().unwrap_or(Value::Null);

    Ok(InboundFrame { id, method, params })
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    pub error: ErrorObject,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

/// A server-initiated JSON-RPC request (used for approval round-trips).
#[derive(Debug, Clone, Serialize)]
pub struct ServerRequestMessage {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Response(ResponseMessage),
    Error(ErrorMessage),
    Notification(NotificationMessage),
    Request(ServerRequestMessage),
}

pub fn response(id: RequestId, result: Value) -> OutboundMessage {
    OutboundMessage::Response(ResponseMessage {
        jsonrpc: JSONRPC_VERSION,
        id: Some(id),
        result,
    })
}

pub fn error_response(id: Option<RequestId>, code: i64, message: impl Into<String>) -> OutboundMessage {
    OutboundMessage::Error(ErrorMessage {
        jsonrpc: JSONRPC_VERSION,
        id,
        error: ErrorObject {
            code,
            message: message.into(),
            data: None,
        },
    })
}

pub fn notification(method: impl Into<String>, params: Value) -> OutboundMessage {
    OutboundMessage::Notification(NotificationMessage {
        jsonrpc: JSONRPC_VERSION,
        method: method.into(),
        params,
    })
}

pub fn server_request(id: RequestId, method: impl Into<String>, params: Value) -> OutboundMessage {
    OutboundMessage::Request(ServerRequestMessage {
        jsonrpc: JSONRPC_VERSION,
        id,
        method: method.into(),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_has_no_id_field() {
        let msg = notification("thread/started", json!({"threadId": "t1"}));
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["method"], "thread/started");
    }

    #[test]
    fn response_serializes_null_id() {
        // A response constructed with id = None would be unusual, but the
        // wire shape must still carry a literal `null`, never omit it.
        let msg = OutboundMessage::Response(ResponseMessage {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            result: json!({}),
        });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["id"], Value::Null);
    }

    #[test]
    fn decode_rejects_missing_method() {
        let err = decode_frame(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRequest(_)));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let err = decode_frame(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Parse(_)));
    }

    #[test]
    fn decode_treats_absent_or_null_id_as_notification() {
        let a = decode_frame(br#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        let b = decode_frame(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert_eq!(a.id, None);
        assert_eq!(b.id, None);
    }

    #[test]
    fn decode_preserves_integer_and_string_ids() {
        let a = decode_frame(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        let b = decode_frame(br#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        assert_eq!(a.id, Some(RequestId::Number(7)));
        assert_eq!(b.id, Some(RequestId::String("abc".to_string())));
    }

    #[test]
    fn parse_int_id_requires_integer_literal() {
        assert_eq!(parse_int_id(&json!(7)), Some(7));
        assert_eq!(parse_int_id(&json!(7.5)), None);
        assert_eq!(parse_int_id(&json!("7")), None);
    }

    #[test]
    fn raw_id_round_trips_through_parse_int_id() {
        let v = json!(42);
        assert!(parse_int_id(&v).is_some());
        assert_eq!(raw_id_to_any(&v), Some(RequestId::Number(42)));
    }
}
