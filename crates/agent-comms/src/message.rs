//! Point-to-point agent messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type the kernel answers itself with a state snapshot
pub const STATUS_REQUEST: &str = "status_request";

/// Reply to [`STATUS_REQUEST`]
pub const STATUS_RESPONSE: &str = "status_response";

/// Message between two agents
///
/// Delivered at most once, synchronously, to the recipient's handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (for correlation)
    pub id: String,

    /// Sending agent ID
    pub from: String,

    /// Receiving agent ID
    pub to: String,

    /// Discriminator the recipient dispatches on
    #[serde(rename = "type")]
    pub message_type: String,

    pub payload: Value,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        message_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            message_type: message_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build the reply to this message, addressed back to its sender
    pub fn reply(&self, message_type: impl Into<String>, payload: Value) -> Self {
        Self::new(self.to.clone(), self.from.clone(), message_type, payload)
    }

    pub fn is_type(&self, message_type: &str) -> bool {
        self.message_type == message_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("agent-1", "agent-2", "review_assigned", serde_json::json!({"pr": 7}));
        assert_eq!(msg.from, "agent-1");
        assert_eq!(msg.to, "agent-2");
        assert!(msg.is_type("review_assigned"));
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_reply_swaps_addresses() {
        let msg = Message::new("a", "b", STATUS_REQUEST, Value::Null);
        let reply = msg.reply(STATUS_RESPONSE, serde_json::json!({"status": "idle"}));
        assert_eq!(reply.from, "b");
        assert_eq!(reply.to, "a");
        assert_ne!(reply.id, msg.id);
    }

    #[test]
    fn test_type_field_serializes_as_type() {
        let msg = Message::new("a", "b", "ping", Value::Null);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ping");
    }
}
