//! Dynamic tool registry (C11): providers register at process start; the
//! registry combines their tool descriptors sorted by provider name, first
//! occurrence of a tool name wins, and empty/whitespace-only names are
//! dropped.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

pub type BuildFn = Arc<dyn Fn() -> Vec<ToolDescriptor> + Send + Sync>;
pub type InstallFn = Arc<dyn Fn() + Send + Sync>;

pub struct ProviderRegistration {
    pub name: String,
    pub install: InstallFn,
    pub build: BuildFn,
}

pub struct DynamicToolRegistry {
    providers: RwLock<Vec<ProviderRegistration>>,
    installed: RwLock<HashSet<String>>,
}

impl DynamicToolRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            installed: RwLock::new(HashSet::new()),
        }
    }

    pub fn register(&self, provider: ProviderRegistration) {
        self.providers.write().unwrap().push(provider);
    }

    /// Runs each provider's install hook exactly once per process, even if
    /// called again later (e.g. after a second agent launch).
    pub fn install_all(&self) {
        let providers = self.providers.read().unwrap();
        let mut installed = self.installed.write().unwrap();
        for provider in providers.iter() {
            if installed.insert(provider.name.clone()) {
                (provider.install)();
            }
        }
    }

    /// Builds the combined tool surface: providers ordered by name, tools
    /// deduplicated by name (first-seen provider wins), empty names dropped.
    pub fn build_tools(&self) -> Vec<ToolDescriptor> {
        let mut by_provider: Vec<(String, Vec<ToolDescriptor>)> = self
            .providers
            .read()
            .unwrap()
            .iter()
            .map(|p| (p.name.clone(), (p.build)()))
            .collect();
        by_provider.sort_by(|a, b| a.0.cmp(&b.0));

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, tools) in by_provider {
            for tool in tools {
                let name = tool.name.trim().to_string();
                if name.is_empty() {
                    continue;
                }
                if seen.insert(name.clone()) {
                    out.push(ToolDescriptor { name, ..tool });
                }
            }
        }
        out
    }
}

impl Default for DynamicToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            schema: json!({}),
        }
    }

    #[test]
    fn dedupes_by_name_first_provider_wins() {
        let registry = DynamicToolRegistry::new();
        registry.register(ProviderRegistration {
            name: "zzz-provider".into(),
            install: Arc::new(|| {}),
            build: Arc::new(|| vec![descriptor("send_message")]),
        });
        registry.register(ProviderRegistration {
            name: "aaa-provider".into(),
            install: Arc::new(|| {}),
            build: Arc::new(|| vec![descriptor("send_message"), descriptor("  "), descriptor("list_agents")]),
        });

        let tools = registry.build_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["send_message", "list_agents"]);
    }

    #[test]
    fn install_all_is_idempotent_per_provider() {
        let registry = DynamicToolRegistry::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.register(ProviderRegistration {
            name: "p1".into(),
            install: Arc::new(move || {
                calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
            build: Arc::new(Vec::new),
        });
        registry.install_all();
        registry.install_all();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
