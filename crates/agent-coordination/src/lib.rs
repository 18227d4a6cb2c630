//! Agent coordination
//!
//! Components that sit beside the agents and watch the work as a whole:
//!
//! - [`EscalationCoordinator`]: SLA deadlines and multi-level escalation
//! - [`PatternTracker`]: effectiveness scoring and versioned evolution of
//!   coordination patterns
//! - [`AggregationMonitor`]: workflow progress, agent snapshots and
//!   bottleneck detection
//!
//! Each one implements [`PeriodicJob`], so a [`JobRunner`] can drive its
//! sweep on a fixed interval.
//!
//! # Example
//!
//! ```no_run
//! use agent_comms::{AgentRegistry, MessageBus};
//! use agent_coordination::{
//!     AggregationMonitor, EscalationCoordinator, InMemoryIssueTracker, JobRunner,
//! };
//! use agent_core::RuntimeConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RuntimeConfig::default();
//!     let bus = MessageBus::new();
//!
//!     let escalation = Arc::new(EscalationCoordinator::new(
//!         config.escalation.clone(),
//!         bus.clone(),
//!         AgentRegistry::new(),
//!         Arc::new(InMemoryIssueTracker::new()),
//!     ));
//!     let monitor = Arc::new(AggregationMonitor::new(config.monitor.clone()).with_bus(bus.clone()));
//!     let attached = monitor.attach(&bus);
//!
//!     let mut jobs = JobRunner::new();
//!     jobs.spawn(escalation, config.escalation.check_interval())?;
//!     jobs.spawn(monitor, config.monitor.tick_interval())?;
//!
//!     tokio::time::sleep(Duration::from_secs(600)).await;
//!     jobs.shutdown().await;
//!     attached.detach().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod escalation;
pub mod integrations;
pub mod jobs;
pub mod monitor;
pub mod patterns;

// Re-exports
pub use error::{CoordinationError, Result};
pub use escalation::{ComplianceStatus, EscalationCoordinator, EscalationRecord, SweepReport};
pub use integrations::{InMemoryIssueTracker, IssueTracker};
pub use jobs::{JobRunner, JobStats, PeriodicJob};
pub use monitor::{
    AggregationMonitor, AttachHandle, Bottleneck, BottleneckKind, DashboardSnapshot,
    DashboardSummary, Severity, WorkflowMetadata, WorkflowState, WorkflowStatus,
};
pub use patterns::{
    Application, EvolutionOutcome, EvolutionReport, NewPattern, Outcome, OutcomeMetrics, PatternRecord,
    PatternStatus, PatternTracker, RecommendContext, Recommendation, UnchangedReason,
};
