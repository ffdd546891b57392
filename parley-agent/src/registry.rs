// ABOUTME: Registry pattern for runtime backend selection.
// ABOUTME: Backends register factories, parley creates agents by backend name from config.

use crate::config::BackendConfig;
use crate::handle::AgentHandle;
use crate::model::ModelClient;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a factory may need to build one agent
pub struct BackendContext<'a> {
    /// Name the agent is registered under
    pub agent_name: &'a str,
    /// Persona instructions from config
    pub instructions: &'a str,
    /// Shared model client, if one is configured
    pub model: Option<Arc<dyn ModelClient>>,
    /// Backend-specific keys
    pub config: &'a Value,
}

/// Factory function that creates an AgentHandle from config
pub type BackendFactory = Box<dyn Fn(&BackendContext<'_>) -> Result<AgentHandle> + Send + Sync>;

/// Registry for runtime backend selection
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory by name
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&BackendContext<'_>) -> Result<AgentHandle> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// Create a backend by name
    pub fn create(&self, name: &str, ctx: &BackendContext<'_>) -> Result<AgentHandle> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown backend: {}", name))?;
        factory(ctx)
    }

    /// List available backend names, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create the backend an agent's config asks for
    pub fn create_from_config(
        &self,
        agent_name: &str,
        instructions: &str,
        model: Option<Arc<dyn ModelClient>>,
        config: &BackendConfig,
    ) -> Result<AgentHandle> {
        let json_config = config.to_json_value();
        let ctx = BackendContext {
            agent_name,
            instructions,
            model,
            config: &json_config,
        };
        self.create(config.backend_type(), &ctx)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        use crate::backends::direct_cli::DirectCliBackend;
        use crate::backends::llm::LlmBackend;
        use crate::backends::mock::MockBackend;

        Self::new()
            .register("mock", MockBackend::factory())
            .register("direct", DirectCliBackend::factory())
            .register("llm", LlmBackend::factory())
    }
}
