//! Error types for the execution kernel

use std::time::Duration;

use agent_comms::CommsError;
use agent_core::AgentError;

use crate::state::AgentStatus;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors returned by agent operations other than task execution
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Admission refused because the agent tracks its maximum number of tasks
    #[error("Agent {agent_id} is at capacity ({current}/{max} tasks)")]
    CapacityExceeded {
        agent_id: String,
        current: usize,
        max: usize,
    },

    /// A task with the same id is still running on this agent
    #[error("Task {task_id} is already running on agent {agent_id}")]
    DuplicateTask { agent_id: String, task_id: String },

    /// Admission refused because the agent is paused
    #[error("Agent {0} is paused")]
    Paused(String),

    /// Requested lifecycle change is not allowed from the current status
    #[error("Agent {agent_id} cannot go from {from} to {to}")]
    InvalidTransition {
        agent_id: String,
        from: AgentStatus,
        to: AgentStatus,
    },

    /// Agent not configured properly
    #[error("Agent configuration error: {0}")]
    Configuration(String),

    /// The handler's initialization hook failed
    #[error("Agent initialization failed: {0}")]
    Initialization(String),

    #[error("Communication error: {0}")]
    Comms(#[from] CommsError),

    /// Generic error from agent-core
    #[error(transparent)]
    CoreError(#[from] AgentError),
}

impl RuntimeError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::Initialization(msg.into())
    }
}

/// Why a task attempt, or a whole task, failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    /// The attempt did not finish within the agent's timeout
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    /// The work function reported an error
    #[error("Task execution failed: {0}")]
    Execution(String),

    /// The work function panicked
    #[error("Task handler panicked: {0}")]
    Panicked(String),

    /// No handler is registered for the task type
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Every attempt failed; carries the last failure
    #[error("Retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: Box<TaskError> },

    /// The submission was dropped before it produced a result
    #[error("Task abandoned before completion")]
    Abandoned,
}

impl TaskError {
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::Execution(msg.into())
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Timeout(_) | TaskError::Execution(_) | TaskError::Panicked(_)
        )
    }

    /// The underlying failure, looking through `RetriesExhausted`
    pub fn root_cause(&self) -> &TaskError {
        match self {
            TaskError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TaskError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(TaskError::execution("boom").is_retryable());
        assert!(TaskError::Panicked("bug".into()).is_retryable());
        assert!(!TaskError::UnknownTaskType("deploy".into()).is_retryable());
        assert!(!TaskError::Abandoned.is_retryable());
    }

    #[test]
    fn test_exhausted_message_keeps_last_error() {
        let err = TaskError::RetriesExhausted {
            attempts: 2,
            last: Box::new(TaskError::execution("boom")),
        };
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("2 attempt"));
        assert_eq!(err.root_cause(), &TaskError::execution("boom"));
    }

    #[test]
    fn test_capacity_message() {
        let err = RuntimeError::CapacityExceeded {
            agent_id: "reviewer-1".into(),
            current: 5,
            max: 5,
        };
        assert_eq!(err.to_string(), "Agent reviewer-1 is at capacity (5/5 tasks)");
    }
}
