//! Error types for agent coordination

use agent_comms::CommsError;
use agent_core::AgentError;
use agent_runtime::RuntimeError;
use agent_store::StoreError;

/// Result type for coordination operations
pub type Result<T> = std::result::Result<T, CoordinationError>;

/// Errors in agent coordination
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Unknown tracked item, pattern, application, workflow or bottleneck
    #[error("{kind} not found: {id}")]
    ItemNotFound { kind: &'static str, id: String },

    /// Item is already under SLA tracking
    #[error("Item already tracked: {0}")]
    AlreadyTracked(String),

    /// Operation not allowed in the record's current state
    #[error("Invalid state for {kind} {id}: {reason}")]
    InvalidState {
        kind: &'static str,
        id: String,
        reason: String,
    },

    /// Malformed input, e.g. an event payload
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External issue tracker failed
    #[error("Issue tracker error: {0}")]
    Tracker(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Communication error
    #[error("Communication error: {0}")]
    Communication(#[from] CommsError),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Generic error from agent-core
    #[error(transparent)]
    CoreError(#[from] AgentError),
}

impl CoordinationError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(kind: &'static str, id: S) -> Self {
        Self::ItemNotFound { kind, id: id.into() }
    }

    pub fn invalid_state<S: Into<String>, R: Into<String>>(kind: &'static str, id: S, reason: R) -> Self {
        Self::InvalidState {
            kind,
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn tracker<S: Into<String>>(msg: S) -> Self {
        Self::Tracker(msg.into())
    }
}
