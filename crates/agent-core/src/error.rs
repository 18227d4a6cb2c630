//! Error types shared by every crate in the workspace
//!
//! Downstream crates wrap [`AgentError`] with `#[from]` so configuration and
//! serialization failures propagate with `?` across crate boundaries.

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Foundational error type
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration could not be located or assembled
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source failed to parse
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] config::ConfigError),

    /// A configuration value is out of range
    #[error("Invalid value for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

/// Render a caught panic payload as text
///
/// Used wherever handler panics are converted into ordinary errors.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = AgentError::config("missing file");
        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: missing file");
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = AgentError::validation("agent.retry_attempts", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid value for `agent.retry_attempts`: must be at least 1"
        );
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = AgentError::from(io_err);
        assert!(matches!(err, AgentError::Io(_)));
    }
}
