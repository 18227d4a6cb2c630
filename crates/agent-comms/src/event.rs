//! Broadcast events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event delivered to every current subscriber of its type
///
/// Fire-and-forget: nothing is stored once `emit` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    /// Emitting agent or component
    pub source: String,

    /// Optional intended recipient; subscribers may ignore events not meant for them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub data: Value,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            target: None,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// True when the event is untargeted or targeted at `agent_id`
    pub fn is_for(&self, agent_id: &str) -> bool {
        self.target.as_deref().map_or(true, |t| t == agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untargeted_event_is_for_everyone() {
        let event = Event::new("sla_escalated", "escalation", serde_json::json!({"level": 1}));
        assert!(event.is_for("reviewer-1"));
        assert!(event.target.is_none());
    }

    #[test]
    fn test_targeted_event() {
        let event = Event::new("reassignment_requested", "escalation", Value::Null)
            .with_target("lead");
        assert!(event.is_for("lead"));
        assert!(!event.is_for("reviewer-1"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reassignment_requested");
        assert_eq!(json["target"], "lead");
    }
}
