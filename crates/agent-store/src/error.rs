//! Error types for record storage

use agent_core::AgentError;

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in a repository
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Storage capacity exceeded
    #[error("Repository {repository} is full ({capacity} records)")]
    CapacityExceeded { repository: String, capacity: usize },

    /// Generic error from agent-core
    #[error(transparent)]
    CoreError(#[from] AgentError),
}

impl StoreError {
    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error() {
        let err = StoreError::storage("disk full");
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_capacity_message() {
        let err = StoreError::CapacityExceeded {
            repository: "patterns".into(),
            capacity: 2,
        };
        assert_eq!(err.to_string(), "Repository patterns is full (2 records)");
    }
}
