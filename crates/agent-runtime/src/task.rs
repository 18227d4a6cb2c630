//! Units of work and their outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Scheduling hint carried with a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A unit of work submitted to an agent
///
/// The kernel only reads a task; it is never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub payload: Value,

    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a task with a fresh id
    pub fn new(task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            priority: Priority::default(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Terminal outcome of one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub completed_at: DateTime<Utc>,

    /// Wall time from submission to result, including backoff waits
    pub duration_ms: u64,

    /// Attempts made, zero if the task was never admitted
    pub attempts: u32,
}

impl TaskResult {
    pub fn success(task_id: impl Into<String>, data: Value, duration: Duration, attempts: u32) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            data: Some(data),
            error: None,
            completed_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            attempts,
        }
    }

    pub fn failure(
        task_id: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            completed_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            attempts,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_gets_unique_id() {
        let a = Task::new("review", json!({"pr": 1}));
        let b = Task::new("review", json!({"pr": 1}));
        assert_ne!(a.id, b.id);
        assert_eq!(a.priority, Priority::Normal);
    }

    #[test]
    fn test_task_wire_shape() {
        let task = Task::new("review", json!({"pr": 7}))
            .with_id("t-1")
            .with_priority(Priority::High);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "review");
        assert_eq!(json["priority"], "high");

        let parsed: Task = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn test_failure_result_omits_data() {
        let result = TaskResult::failure("t-1", "boom", Duration::from_millis(1500), 2);
        assert!(!result.success);
        assert_eq!(result.duration(), Duration::from_millis(1500));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Low < Priority::Normal);
    }
}
