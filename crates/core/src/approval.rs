//! Approval coordinator (C8): dedups concurrent approval requests for the
//! same `(agent_id, notification_method)` pair, round-trips the decision
//! through a connected UI broker with a bounded timeout, and denies by
//! default whenever no broker is present, the round trip times out, or the
//! approve/deny callback itself fails.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use acp_runtime::AgentEvent;
use serde_json::{Value, json};

use crate::connections::Connection;

pub struct ApprovalCoordinator {
    inflight: StdMutex<HashSet<(String, String)>>,
    timeout: Duration,
}

impl ApprovalCoordinator {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            inflight: StdMutex::new(HashSet::new()),
            timeout,
        })
    }

    /// Handles one approval-bearing event for `agent_id`/`method`. A second
    /// concurrent call with the same key returns immediately without
    /// touching the event's callbacks, leaving the first caller's round trip
    /// as the sole arbiter.
    pub async fn handle_approval_request(
        &self,
        agent_id: &str,
        method: &str,
        broker: Option<Arc<Connection>>,
        event: AgentEvent,
    ) {
        let key = (agent_id.to_string(), method.to_string());
        let first = {
            let mut set = self.inflight.lock().unwrap();
            set.insert(key.clone())
        };
        if !first {
            tracing::debug!(agent_id, method, "approval already in flight, ignoring duplicate");
            return;
        }

        if let Err(e) = self.route(method, broker, event).await {
            tracing::warn!(agent_id, method, error = %e, "approval callback failed");
        }

        self.inflight.lock().unwrap().remove(&key);
    }

    async fn route(
        &self,
        method: &str,
        broker: Option<Arc<Connection>>,
        event: AgentEvent,
    ) -> Result<(), String> {
        let AgentEvent { approve, deny, .. } = event;

        let Some(conn) = broker else {
            return run_deny(deny);
        };

        let receiver = conn
            .send_request(method, json!({"method": method}))
            .await;

        let reply = tokio::time::timeout(self.timeout, receiver).await;
        match reply {
            Ok(Ok(decision)) if is_approved(&decision) => run_approve(approve),
            Ok(Ok(_)) => run_deny(deny),
            Ok(Err(_)) => run_deny(deny), // sender dropped without a reply
            Err(_) => run_deny(deny),     // round trip timed out
        }
    }
}

fn is_approved(decision: &Value) -> bool {
    decision
        .get("decision")
        .and_then(Value::as_str)
        .map(|s| s == "approve" || s == "approved")
        .unwrap_or(false)
}

fn run_approve(approve: Option<acp_runtime::ApprovalFn>) -> Result<(), String> {
    match approve {
        Some(f) => f(),
        None => Ok(()),
    }
}

fn run_deny(deny: Option<acp_runtime::ApprovalFn>) -> Result<(), String> {
    match deny {
        Some(f) => f(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn event_with_counters() -> (AgentEvent, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let approved = Arc::new(AtomicUsize::new(0));
        let denied = Arc::new(AtomicUsize::new(0));
        let a = approved.clone();
        let d = denied.clone();
        let event = AgentEvent {
            event_type: "exec_approval_request".into(),
            data: json!({}),
            approve: Some(Box::new(move || {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            deny: Some(Box::new(move || {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            respond: None,
        };
        (event, approved, denied)
    }

    #[tokio::test]
    async fn denies_when_no_broker_present() {
        let coord = ApprovalCoordinator::new(Duration::from_millis(50));
        let (event, approved, denied) = event_with_counters();
        coord
            .handle_approval_request("agent-1", "thread/execApproval", None, event)
            .await;
        assert_eq!(approved.load(Ordering::SeqCst), 0);
        assert_eq!(denied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn denies_on_timeout() {
        let coord = ApprovalCoordinator::new(Duration::from_millis(20));
        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new("c1", tx));
        let (event, approved, denied) = event_with_counters();
        coord
            .handle_approval_request("agent-1", "thread/execApproval", Some(conn), event)
            .await;
        assert_eq!(approved.load(Ordering::SeqCst), 0);
        assert_eq!(denied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn approves_on_matching_decision() {
        let coord = ApprovalCoordinator::new(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new("c1", tx));
        let (event, approved, denied) = event_with_counters();

        let conn_for_reply = conn.clone();
        tokio::spawn(async move {
            let _ = rx.recv().await;
            conn_for_reply.resolve_pending(1, json!({"decision": "approve"})).await;
        });

        coord
            .handle_approval_request("agent-1", "thread/execApproval", Some(conn), event)
            .await;
        assert_eq!(approved.load(Ordering::SeqCst), 1);
        assert_eq!(denied.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dedups_concurrent_requests_for_same_key() {
        let coord = ApprovalCoordinator::new(Duration::from_millis(50));
        let (event1, approved1, denied1) = event_with_counters();
        let (event2, approved2, denied2) = event_with_counters();

        let c1 = coord.clone();
        let h1 = tokio::spawn(async move {
            c1.handle_approval_request("agent-1", "thread/execApproval", None, event1)
                .await;
        });
        let c2 = coord.clone();
        let h2 = tokio::spawn(async move {
            c2.handle_approval_request("agent-1", "thread/execApproval", None, event2)
                .await;
        });
        let _ = tokio::join!(h1, h2);

        let total_denied = denied1.load(Ordering::SeqCst) + denied2.load(Ordering::SeqCst);
        let total_approved = approved1.load(Ordering::SeqCst) + approved2.load(Ordering::SeqCst);
        assert_eq!(total_approved, 0);
        assert_eq!(total_denied, 1, "only the first caller should act; the second is a no-op");
    }
}
