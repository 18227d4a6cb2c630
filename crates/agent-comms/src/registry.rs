//! Agent directory for discovery by capability

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the directory knows about an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
}

impl AgentEntry {
    pub fn new<I, S>(id: impl Into<String>, agent_type: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Registry for agent discovery
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<DashMap<String, AgentEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: AgentEntry) {
        tracing::debug!(agent_id = %entry.id, agent_type = %entry.agent_type, "Registered agent");
        self.agents.insert(entry.id.clone(), entry);
    }

    pub fn unregister(&self, id: &str) -> Option<AgentEntry> {
        self.agents.remove(id).map(|(_, entry)| entry)
    }

    pub fn lookup(&self, id: &str) -> Option<AgentEntry> {
        self.agents.get(id).map(|e| e.clone())
    }

    /// Agents offering a capability, ordered by id
    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentEntry> {
        let mut found: Vec<AgentEntry> = self
            .agents
            .iter()
            .filter(|e| e.value().has_capability(capability))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    pub fn list_all(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
