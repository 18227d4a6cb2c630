//! Observable agent state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle status of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Paused,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an agent's bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub status: AgentStatus,

    /// Ids of tasks currently in flight
    pub current_tasks: BTreeSet<String>,

    pub completed_count: u64,
    pub error_count: u64,
    pub last_activity: DateTime<Utc>,
}

impl AgentState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: AgentStatus::Idle,
            current_tasks: BTreeSet::new(),
            completed_count: 0,
            error_count: 0,
            last_activity: Utc::now(),
        }
    }

    pub fn load(&self) -> usize {
        self.current_tasks.len()
    }

    pub fn is_at_capacity(&self, max_concurrent_tasks: usize) -> bool {
        self.current_tasks.len() >= max_concurrent_tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = AgentState::new("worker-1");
        assert_eq!(state.status, AgentStatus::Idle);
        assert_eq!(state.load(), 0);
        assert!(!state.is_at_capacity(1));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let mut state = AgentState::new("worker-1");
        state.status = AgentStatus::Paused;
        state.current_tasks.insert("t-2".into());
        state.current_tasks.insert("t-1".into());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "paused");
        assert_eq!(json["current_tasks"], serde_json::json!(["t-1", "t-2"]));
        assert_eq!(AgentStatus::Busy.to_string(), "busy");
    }
}
