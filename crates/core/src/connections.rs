//! Connection registry (C6): tracks connected clients and broadcasts
//! notifications to them best-effort. A slow or dead connection never blocks
//! or fails a broadcast to the others; grounded in the outgoing-message
//! sender's callback-map pattern, generalized to many connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use acp_protocol::{OutboundMessage, RequestId};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

pub struct Connection {
    pub id: String,
    sender: mpsc::Sender<OutboundMessage>,
    next_request_id: AtomicI64,
    pending: Mutex<HashMap<i64, oneshot::Sender<Value>>>,
}

impl Connection {
    pub fn new(id: impl Into<String>, sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: id.into(),
            sender,
            next_request_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Best-effort send: a full or closed channel is logged and dropped,
    /// never propagated as an error to the caller.
    pub fn send(&self, msg: OutboundMessage) {
        if let Err(e) = self.sender.try_send(msg) {
            tracing::warn!(connection_id = %self.id, error = %e, "dropping outbound message");
        }
    }

    /// Sends a server-initiated request and returns a receiver that resolves
    /// when [`Connection::resolve_pending`] is called with the matching id.
    pub async fn send_request(&self, method: &str, params: Value) -> oneshot::Receiver<Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        self.send(acp_protocol::server_request(
            RequestId::Number(id),
            method.to_string(),
            params,
        ));
        rx
    }

    /// Resolves a pending server-initiated request by id. Returns `true` if
    /// a pending callback was found and fired.
    pub async fn resolve_pending(&self, id: i64, result: Value) -> bool {
        if let Some(tx) = self.pending.lock().await.remove(&id) {
            let _ = tx.send(result);
            true
        } else {
            false
        }
    }
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add(&self, conn: Arc<Connection>) {
        self.connections.write().await.insert(conn.id.clone(), conn);
    }

    pub async fn remove(&self, id: &str) {
        self.connections.write().await.remove(id);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Returns an arbitrary connected client, used as the approval broker
    /// when exactly one UI is expected to be attached.
    pub async fn first(&self) -> Option<Arc<Connection>> {
        self.connections.read().await.values().next().cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Broadcasts a notification to every connected client. If the
    /// notification itself fails to marshal (e.g. a non-finite float), the
    /// error is logged and nothing is sent to anyone.
    pub async fn broadcast(&self, method: &str, params: Value) {
        let msg = acp_protocol::notification(method.to_string(), params);
        if let Err(e) = serde_json::to_vec(&msg) {
            tracing::error!(method, error = %e, "failed to marshal notification, dropping broadcast");
            return;
        }
        let conns = self.connections.read().await;
        for conn in conns.values() {
            conn.send(msg.clone());
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
