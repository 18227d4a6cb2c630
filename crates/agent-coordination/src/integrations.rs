//! External collaborator boundaries

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{CoordinationError, Result};

/// Issue tracker capability (Linear, GitHub, ...)
///
/// Coordinators only need these three calls; HTTP clients live outside
/// this workspace and implement the trait.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_status(&self, issue_id: &str) -> Result<String>;

    async fn update_status(&self, issue_id: &str, status: &str) -> Result<()>;

    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct Issue {
    status: String,
    comments: Vec<String>,
}

/// In-memory issue tracker for tests and local runs
///
/// Issues are created on first write. Can be switched into a failing mode to
/// simulate an outage.
#[derive(Clone, Default)]
pub struct InMemoryIssueTracker {
    issues: Arc<DashMap<String, Issue>>,
    failing: Arc<AtomicBool>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
}

impl InMemoryIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an issue with a status
    pub fn with_issue(self, issue_id: impl Into<String>, status: impl Into<String>) -> Self {
        self.issues.insert(
            issue_id.into(),
            Issue {
                status: status.into(),
                comments: Vec::new(),
            },
        );
        self
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn comments(&self, issue_id: &str) -> Vec<String> {
        self.issues
            .get(issue_id)
            .map(|issue| issue.comments.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, issue_id: &str) -> Option<String> {
        self.issues.get(issue_id).map(|issue| issue.status.clone())
    }

    /// Get number of calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(CoordinationError::tracker("issue tracker unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IssueTracker for InMemoryIssueTracker {
    async fn get_status(&self, issue_id: &str) -> Result<String> {
        self.check_available()?;
        self.status(issue_id)
            .ok_or_else(|| CoordinationError::not_found("issue", issue_id))
    }

    async fn update_status(&self, issue_id: &str, status: &str) -> Result<()> {
        self.check_available()?;
        self.issues.entry(issue_id.to_string()).or_default().status = status.to_string();
        Ok(())
    }

    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<()> {
        self.check_available()?;
        self.issues
            .entry(issue_id.to_string())
            .or_default()
            .comments
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_round_trip() {
        let tracker = InMemoryIssueTracker::new().with_issue("PR-1", "in_review");
        assert_eq!(tracker.get_status("PR-1").await.unwrap(), "in_review");

        tracker.update_status("PR-1", "escalated").await.unwrap();
        assert_eq!(tracker.status("PR-1").as_deref(), Some("escalated"));
    }

    #[tokio::test]
    async fn test_unknown_issue() {
        let tracker = InMemoryIssueTracker::new();
        let err = tracker.get_status("nope").await.unwrap_err();
        assert!(matches!(err, CoordinationError::ItemNotFound { kind: "issue", .. }));
    }

    #[tokio::test]
    async fn test_comments_create_issue() {
        let tracker = InMemoryIssueTracker::new();
        tracker.add_comment("PR-2", "first").await.unwrap();
        tracker.add_comment("PR-2", "second").await.unwrap();
        assert_eq!(tracker.comments("PR-2"), vec!["first", "second"]);
        assert_eq!(tracker.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let tracker = InMemoryIssueTracker::new();
        tracker.set_failing(true);
        assert!(matches!(
            tracker.add_comment("PR-3", "hello").await,
            Err(CoordinationError::Tracker(_))
        ));
        assert!(tracker.comments("PR-3").is_empty());

        tracker.set_failing(false);
        assert!(tracker.add_comment("PR-3", "hello").await.is_ok());
    }
}
