// ABOUTME: Agent registry - the single owner of the name to AgentHandle mapping.
// ABOUTME: Register replaces, unregister is silent; names are validated against reserved tokens.

use crate::error::ChatError;
use crate::mentions::{is_valid_identifier, ALL, HUMAN};
use crate::metrics;
use parley_agent::AgentHandle;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentHandle>>,
}

/// Check that `name` can be registered as an agent
pub fn validate_agent_name(name: &str) -> Result<(), ChatError> {
    if name == HUMAN || name == ALL {
        return Err(ChatError::ReservedName(name.to_string()));
    }
    if !is_valid_identifier(name) {
        return Err(ChatError::InvalidAgentName(name.to_string()));
    }
    Ok(())
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the handle for `name`. Returns the replaced handle, if any.
    pub fn register(
        &self,
        name: &str,
        handle: AgentHandle,
    ) -> Result<Option<AgentHandle>, ChatError> {
        validate_agent_name(name)?;
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        let previous = agents.insert(name.to_string(), handle);
        metrics::set_registered_agents(agents.len());
        tracing::info!(agent = %name, replaced = previous.is_some(), "Agent registered");
        Ok(previous)
    }

    /// Remove `name`. Unknown names are ignored.
    pub fn unregister(&self, name: &str) -> Option<AgentHandle> {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        let removed = agents.remove(name);
        metrics::set_registered_agents(agents.len());
        if removed.is_some() {
            tracing::info!(agent = %name, "Agent unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<AgentHandle> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Name, handle pairs sorted by name
    pub fn snapshot(&self) -> Vec<(String, AgentHandle)> {
        let mut pairs: Vec<(String, AgentHandle)> = self
            .agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
