//! Turn tracker (C7): per-thread turn state machine (absent -> running ->
//! completed/interrupted/failed -> absent), a watchdog timer per running
//! turn, and the interrupt-settling protocol used by `thread/interrupt`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use std::sync::RwLock as StdRwLock;

use crate::normalize::Payload;

pub type NotifyHook = Arc<dyn Fn(String, Value) + Send + Sync>;

struct TurnState {
    turn_id: String,
    #[allow(dead_code)]
    started_at: Instant,
    interrupt_requested: bool,
    watchdog: JoinHandle<()>,
}

pub struct TurnTracker {
    turns: RwLock<HashMap<String, TurnState>>,
    watchdog_timeout: Duration,
    notify_hook: StdRwLock<Option<NotifyHook>>,
}

impl TurnTracker {
    pub fn new(watchdog_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            turns: RwLock::new(HashMap::new()),
            watchdog_timeout,
            notify_hook: StdRwLock::new(None),
        })
    }

    pub fn set_notify_hook(&self, hook: NotifyHook) {
        *self.notify_hook.write().unwrap() = Some(hook);
    }

    /// Begins tracking a turn on `thread_id`, replacing and cancelling any
    /// watchdog already running for it.
    pub async fn begin(self: &Arc<Self>, thread_id: &str, turn_id: String) {
        let watchdog = {
            let tracker = self.clone();
            let tid = thread_id.to_string();
            let timeout = self.watchdog_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracker.fire_watchdog(&tid).await;
            })
        };
        let mut turns = self.turns.write().await;
        if let Some(prev) = turns.remove(thread_id) {
            prev.watchdog.abort();
        }
        turns.insert(
            thread_id.to_string(),
            TurnState {
                turn_id,
                started_at: Instant::now(),
                interrupt_requested: false,
                watchdog,
            },
        );
    }

    /// Marks a running turn as interrupt-requested. Returns `false` if no
    /// turn is running on `thread_id`.
    pub async fn mark_interrupt_requested(&self, thread_id: &str) -> bool {
        let mut turns = self.turns.write().await;
        if let Some(state) = turns.get_mut(thread_id) {
            state.interrupt_requested = true;
            true
        } else {
            false
        }
    }

    /// Completes the tracked turn on `thread_id`. If an interrupt was
    /// requested and the reported status is `completed`, the returned status
    /// is rewritten to `interrupted` so the UI doesn't show a clean finish
    /// for a turn the user asked to stop.
    pub async fn complete(&self, thread_id: &str, status: &str) -> (String, bool) {
        let removed = self.turns.write().await.remove(thread_id);
        let Some(state) = removed else {
            return (status.to_string(), false);
        };
        state.watchdog.abort();
        let final_status = if state.interrupt_requested && status == "completed" {
            "interrupted".to_string()
        } else {
            status.to_string()
        };
        (final_status, true)
    }

    /// Only completes the turn if its tracked id matches `turn_id`; a stale
    /// completion for a superseded turn is a no-op.
    pub async fn complete_by_id(&self, thread_id: &str, turn_id: &str, status: &str) -> (String, bool) {
        {
            let turns = self.turns.read().await;
            match turns.get(thread_id) {
                Some(state) if state.turn_id == turn_id => {}
                _ => return (status.to_string(), false),
            }
        }
        self.complete(thread_id, status).await
    }

    async fn fire_watchdog(&self, thread_id: &str) {
        let existed = self.turns.write().await.remove(thread_id);
        if existed.is_none() {
            return;
        }
        let mut payload = Payload::new();
        payload.insert("threadId".into(), json!(thread_id));
        payload.insert("status".into(), json!("failed"));
        payload.insert("reason".into(), json!("watchdog_timeout"));
        let hook = self.notify_hook.read().unwrap().clone();
        if let Some(hook) = hook {
            hook("turn/completed".to_string(), Value::Object(payload));
        }
    }

    /// Synthesizes a `turn/completed` notification for terminal-class event
    /// types (`stream_error`, `turn_aborted`) unless the payload already
    /// carries a `uiType`, which would mean a real terminal event is already
    /// in flight (replay guard). Returns `true` if a synthetic completion
    /// was fired.
    pub async fn maybe_finalize(
        &self,
        thread_id: &str,
        event_type: &str,
        payload: &mut Payload,
    ) -> bool {
        if payload.contains_key("uiType") {
            return false;
        }
        let status = match event_type {
            "stream_error" => "failed",
            "turn_aborted" => "interrupted",
            _ => return false,
        };
        let (final_status, _) = self.complete(thread_id, status).await;
        payload.insert("status".into(), json!(final_status));
        let hook = self.notify_hook.read().unwrap().clone();
        if let Some(hook) = hook {
            hook("turn/completed".to_string(), Value::Object(payload.clone()));
        }
        true
    }

    /// Polls until the turn on `thread_id` settles (is no longer tracked) or
    /// `idle_probe` reports the UI runtime mirror has gone idle, whichever
    /// comes first, bounded by `timeout`.
    pub async fn wait_interrupt_settled<F, Fut>(
        &self,
        thread_id: &str,
        timeout: Duration,
        idle_probe: F,
    ) -> (bool, Option<&'static str>)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.turns.read().await.contains_key(thread_id) {
                return (true, Some("settled"));
            }
            if idle_probe().await {
                return (true, Some("idle"));
            }
            if Instant::now() >= deadline {
                return (false, None);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn interrupt_requested_rewrites_completed_to_interrupted() {
        let tracker = TurnTracker::new(Duration::from_secs(60));
        tracker.begin("t1", "turn-1".to_string()).await;
        assert!(tracker.mark_interrupt_requested("t1").await);
        let (status, existed) = tracker.complete("t1", "completed").await;
        assert!(existed);
        assert_eq!(status, "interrupted");
    }

    #[tokio::test]
    async fn complete_by_id_ignores_stale_turn() {
        let tracker = TurnTracker::new(Duration::from_secs(60));
        tracker.begin("t1", "turn-1".to_string()).await;
        tracker.begin("t1", "turn-2".to_string()).await;
        let (_, existed) = tracker.complete_by_id("t1", "turn-1", "completed").await;
        assert!(!existed);
        let (_, existed) = tracker.complete_by_id("t1", "turn-2", "completed").await;
        assert!(existed);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_synthetic_completion() {
        let tracker = TurnTracker::new(Duration::from_millis(50));
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let fired_clone = fired.clone();
        tracker.set_notify_hook(Arc::new(move |method, params| {
            fired_clone.lock().unwrap().push((method, params));
        }));
        tracker.begin("t1", "turn-1".to_string()).await;
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        let calls = fired.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "turn/completed");
        assert_eq!(calls[0].1["reason"], json!("watchdog_timeout"));
    }

    #[tokio::test]
    async fn maybe_finalize_respects_replay_guard() {
        let tracker = TurnTracker::new(Duration::from_secs(60));
        tracker.begin("t1", "turn-1".to_string()).await;
        let mut payload = Payload::new();
        payload.insert("uiType".into(), json!("already-terminal"));
        let synthesized = tracker.maybe_finalize("t1", "stream_error", &mut payload).await;
        assert!(!synthesized);
    }

    #[tokio::test]
    async fn wait_interrupt_settled_returns_once_turn_clears() {
        let tracker = Arc::new(TurnTracker::new(Duration::from_secs(60)));
        tracker.begin("t1", "turn-1".to_string()).await;
        let clear_tracker = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            clear_tracker.complete("t1", "completed").await;
        });
        let never_idle = AtomicBool::new(false);
        let (confirmed, state) = tracker
            .wait_interrupt_settled("t1", Duration::from_secs(1), || async {
                never_idle.load(Ordering::SeqCst)
            })
            .await;
        assert!(confirmed);
        assert_eq!(state, Some("settled"));
    }
}
