//! Error types for agent communication

use agent_core::AgentError;

/// Result type for communication operations
pub type Result<T> = std::result::Result<T, CommsError>;

/// Errors in agent communication
#[derive(Debug, thiserror::Error)]
pub enum CommsError {
    /// No mailbox is registered for the addressed agent
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// The recipient's handler failed or panicked
    #[error("Message delivery to {to} failed: {reason}")]
    DeliveryFailed { to: String, reason: String },

    /// Raised by handlers that refuse message types they do not know
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// An event or message handler reported a failure
    #[error("Handler error: {0}")]
    Handler(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error from agent-core
    #[error(transparent)]
    CoreError(#[from] AgentError),
}

impl CommsError {
    /// Create a delivery failed error
    pub fn delivery_failed(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create a handler error
    pub fn handler<S: Into<String>>(msg: S) -> Self {
        Self::Handler(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_failed_display() {
        let err = CommsError::delivery_failed("reviewer-1", "mailbox closed");
        assert_eq!(
            err.to_string(),
            "Message delivery to reviewer-1 failed: mailbox closed"
        );
    }

    #[test]
    fn test_wraps_core_error() {
        let err: CommsError = AgentError::config("bad").into();
        assert!(matches!(err, CommsError::CoreError(_)));
    }
}
