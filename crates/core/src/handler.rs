//! Typed handler adapter (C2): wraps a strongly-typed `(ctx, P) -> (R, err)`
//! function as a generic `Handler(ctx, raw) -> (Value, err)`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;

/// Per-request context. Cancellation on connection close is handled by the
/// dispatch loop dropping the handler future, not by a token threaded
/// through here; this mirrors the request context carrying only identity.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub connection_id: String,
}

/// Which JSON-RPC error code a handler failure maps to at the dispatch
/// core. `Overloaded` carries the backpressure signal an `AgentManager` can
/// raise (e.g. `RuntimeError::Overloaded`) through to `-32001` instead of
/// being flattened into a generic `-32603`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    InvalidParams,
    Overloaded,
    Internal,
}

/// A handler error. `kind` tells the dispatch core which JSON-RPC error
/// code to render; `invalid_params` distinguishes a decode failure (mapped
/// to `-32602`) from every other handler failure (mapped to `-32603`,
/// except `Overloaded` which maps to `-32001`).
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub kind: HandlerErrorKind,
    pub message: String,
}

impl HandlerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::InvalidParams,
            message: message.into(),
        }
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::Overloaded,
            message: message.into(),
        }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;
pub type Handler = Arc<dyn Fn(RequestContext, Value) -> HandlerFuture + Send + Sync>;

/// Adapt a typed async function into a [`Handler`]. `P` must implement
/// `Default` so that a nil/empty params payload decodes to its zero value
/// rather than failing.
pub fn typed<P, R, F, Fut>(f: F) -> Handler
where
    P: DeserializeOwned + Default + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |ctx, raw| {
        let f = f.clone();
        Box::pin(async move {
            let params: P = if raw.is_null() {
                P::default()
            } else {
                serde_json::from_value(raw)
                    .map_err(|e| HandlerError::invalid_params(format!("invalid params: {e}")))?
            };
            let result = f(ctx, params).await?;
            serde_json::to_value(result)
                .map_err(|e| HandlerError::internal(format!("failed to serialize result: {e}")))
        })
    })
}

/// A handler that always succeeds with `{}`. Used for protocol-required
/// method names that have no behavior yet.
pub fn noop_handler() -> Handler {
    Arc::new(|_ctx, _raw| Box::pin(async { Ok(json!({})) }))
}

/// A handler that always succeeds with a fixed value.
pub fn stub_handler(value: Value) -> Handler {
    Arc::new(move |_ctx, _raw| {
        let value = value.clone();
        Box::pin(async move { Ok(value) })
    })
}
