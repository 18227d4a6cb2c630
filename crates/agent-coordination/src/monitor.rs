//! Workflow and agent aggregation with bottleneck detection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use agent_comms::{CommsError, Event, MessageBus, SubscriptionId};
use agent_core::MonitorSettings;
use agent_runtime::{AgentState, AgentStatus, AGENT_STATE_CHANGED};
use agent_store::{InMemoryRepository, Repository};
use agent_telemetry::{Metric, MetricsSink, NoopSink};

use crate::{CoordinationError, PeriodicJob, Result};

pub const WORKFLOW_STARTED: &str = "workflow_started";
pub const WORKFLOW_PROGRESS: &str = "workflow_progress";
pub const WORKFLOW_COMPLETED: &str = "workflow_completed";
pub const WORKFLOW_FAILED: &str = "workflow_failed";
pub const BOTTLENECK_DETECTED: &str = "bottleneck_detected";

/// Event types [`AggregationMonitor::attach`] subscribes to
pub const MONITORED_EVENTS: [&str; 5] = [
    WORKFLOW_STARTED,
    WORKFLOW_PROGRESS,
    WORKFLOW_COMPLETED,
    WORKFLOW_FAILED,
    AGENT_STATE_CHANGED,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub name: String,
    pub expected_duration_ms: u64,
}

impl WorkflowMetadata {
    pub fn new(name: impl Into<String>, expected_duration: Duration) -> Self {
        Self {
            name: name.into(),
            expected_duration_ms: expected_duration.as_millis() as u64,
        }
    }

    pub fn expected_duration(&self) -> Duration {
        Duration::from_millis(self.expected_duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub metadata: WorkflowMetadata,
    pub status: WorkflowStatus,
    /// Fraction done, `[0, 1]`
    pub progress: f64,
    pub registered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    WorkflowTimeout,
    AgentOverload,
    AgentErrors,
}

impl BottleneckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BottleneckKind::WorkflowTimeout => "workflow_timeout",
            BottleneckKind::AgentOverload => "agent_overload",
            BottleneckKind::AgentErrors => "agent_errors",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    /// Stable per condition, e.g. `workflow:<id>:timeout`
    pub id: String,
    pub kind: BottleneckKind,
    pub severity: Severity,
    /// Workflow or agent id
    pub subject: String,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Bottleneck {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_workflows: usize,
    pub pending: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean progress over all workflows, 0 when there are none
    pub average_progress: f64,
    pub total_agents: usize,
    pub busy_agents: usize,
    pub errored_agents: usize,
    pub open_bottlenecks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub workflows: Vec<WorkflowState>,
    pub agents: Vec<AgentState>,
    /// Open bottlenecks only
    pub bottlenecks: Vec<Bottleneck>,
    pub summary: DashboardSummary,
}

/// Aggregates workflow and agent state into bottlenecks and dashboards
pub struct AggregationMonitor {
    id: String,
    settings: MonitorSettings,
    workflows: Arc<dyn Repository<WorkflowState>>,
    agents: DashMap<String, AgentState>,
    bottlenecks: DashMap<String, Bottleneck>,
    metrics: Arc<dyn MetricsSink>,
    bus: Option<MessageBus>,
    write_lock: Mutex<()>,
}

impl AggregationMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            id: "aggregation-monitor".to_string(),
            settings,
            workflows: Arc::new(InMemoryRepository::new("workflows")),
            agents: DashMap::new(),
            bottlenecks: DashMap::new(),
            metrics: Arc::new(NoopSink),
            bus: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_repository(mut self, workflows: Arc<dyn Repository<WorkflowState>>) -> Self {
        self.workflows = workflows;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Announce new bottlenecks on a bus
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn register_workflow(&self, workflow_id: &str, metadata: WorkflowMetadata) -> Result<WorkflowState> {
        if metadata.expected_duration_ms == 0 {
            return Err(CoordinationError::invalid_input(format!(
                "workflow {} needs a non-zero expected duration",
                workflow_id
            )));
        }

        let _guard = self.write_lock.lock().await;
        if self.workflows.contains(workflow_id).await? {
            return Err(CoordinationError::AlreadyTracked(workflow_id.to_string()));
        }

        let state = WorkflowState {
            id: workflow_id.to_string(),
            metadata,
            status: WorkflowStatus::Pending,
            progress: 0.0,
            registered_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        };
        self.workflows.put(workflow_id, state.clone()).await?;
        tracing::info!(workflow_id, name = %state.metadata.name, "Workflow registered");
        Ok(state)
    }

    pub async fn workflow(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found("workflow", workflow_id))
    }

    /// Start a pending workflow or resume a paused one
    pub async fn start_workflow(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.transition(workflow_id, "start", |wf, now| match wf.status {
            WorkflowStatus::Pending => {
                wf.started_at = Some(now);
                wf.status = WorkflowStatus::Running;
                Ok(())
            }
            WorkflowStatus::Paused => {
                wf.status = WorkflowStatus::Running;
                Ok(())
            }
            _ => Err("only pending or paused workflows can start"),
        })
        .await
    }

    pub async fn update_progress(&self, workflow_id: &str, progress: f64) -> Result<WorkflowState> {
        if !progress.is_finite() {
            return Err(CoordinationError::invalid_input("progress must be a finite number"));
        }
        self.transition(workflow_id, "progress", |wf, _| {
            if wf.status != WorkflowStatus::Running {
                return Err("progress only applies to running workflows");
            }
            wf.progress = progress.clamp(0.0, 1.0);
            Ok(())
        })
        .await
    }

    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.transition(workflow_id, "pause", |wf, _| {
            if wf.status != WorkflowStatus::Running {
                return Err("only running workflows can pause");
            }
            wf.status = WorkflowStatus::Paused;
            Ok(())
        })
        .await
    }

    pub async fn complete_workflow(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.transition(workflow_id, "complete", |wf, now| {
            if !matches!(wf.status, WorkflowStatus::Running | WorkflowStatus::Paused) {
                return Err("only started workflows can complete");
            }
            wf.status = WorkflowStatus::Completed;
            wf.progress = 1.0;
            wf.finished_at = Some(now);
            Ok(())
        })
        .await
    }

    pub async fn fail_workflow(&self, workflow_id: &str, error: impl Into<String>) -> Result<WorkflowState> {
        let error = error.into();
        self.transition(workflow_id, "fail", move |wf, now| {
            if wf.status.is_terminal() {
                return Err("workflow already finished");
            }
            wf.status = WorkflowStatus::Failed;
            wf.finished_at = Some(now);
            wf.error = Some(error);
            Ok(())
        })
        .await
    }

    async fn transition<F>(&self, workflow_id: &str, action: &str, apply: F) -> Result<WorkflowState>
    where
        F: FnOnce(&mut WorkflowState, DateTime<Utc>) -> std::result::Result<(), &'static str>,
    {
        let _guard = self.write_lock.lock().await;
        let mut workflow = self.workflow(workflow_id).await?;
        let from = workflow.status;

        apply(&mut workflow, Utc::now())
            .map_err(|reason| CoordinationError::invalid_state("workflow", workflow_id, reason))?;
        self.workflows.put(workflow_id, workflow.clone()).await?;

        tracing::debug!(
            workflow_id,
            action,
            from = ?from,
            to = ?workflow.status,
            progress = workflow.progress,
            "Workflow updated"
        );
        Ok(workflow)
    }

    /// Store the latest snapshot of an agent
    pub fn register_agent_state(&self, agent_id: &str, state: AgentState) {
        tracing::trace!(agent_id, status = %state.status, load = state.load(), "Agent state received");
        self.agents.insert(agent_id.to_string(), state);
    }

    pub fn agent_state(&self, agent_id: &str) -> Option<AgentState> {
        self.agents.get(agent_id).map(|s| s.value().clone())
    }

    /// Apply one bus event; unrelated event types are ignored
    pub async fn handle_event(&self, event: &Event) -> Result<()> {
        match event.event_type.as_str() {
            WORKFLOW_STARTED => {
                self.start_workflow(workflow_id(event)?).await?;
            }
            WORKFLOW_PROGRESS => {
                let progress = event.data["progress"].as_f64().ok_or_else(|| {
                    CoordinationError::invalid_input("workflow_progress event without numeric progress")
                })?;
                self.update_progress(workflow_id(event)?, progress).await?;
            }
            WORKFLOW_COMPLETED => {
                self.complete_workflow(workflow_id(event)?).await?;
            }
            WORKFLOW_FAILED => {
                let error = event.data["error"].as_str().unwrap_or("unspecified failure");
                self.fail_workflow(workflow_id(event)?, error).await?;
            }
            AGENT_STATE_CHANGED => {
                let state: AgentState = serde_json::from_value(event.data.clone())
                    .map_err(|e| CoordinationError::invalid_input(format!("bad agent state: {}", e)))?;
                let agent_id = state.id.clone();
                self.register_agent_state(&agent_id, state);
            }
            other => {
                tracing::trace!(event_type = other, "Ignoring event");
            }
        }
        Ok(())
    }

    /// Feed bus events into this monitor
    ///
    /// Subscribers only enqueue; a spawned task applies events in arrival
    /// order, so emitters never wait on the monitor.
    pub fn attach(self: &Arc<Self>, bus: &MessageBus) -> AttachHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let subscriptions: Vec<SubscriptionId> = MONITORED_EVENTS
            .iter()
            .map(|event_type| {
                let tx = tx.clone();
                bus.subscribe(*event_type, move |event: &Event| {
                    tx.send(event.clone())
                        .map_err(|_| CommsError::handler("aggregation monitor detached"))
                })
            })
            .collect();
        drop(tx);

        let monitor = Arc::clone(self);
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = monitor.handle_event(&event).await {
                    tracing::warn!(event_type = %event.event_type, error = %e, "Monitor could not apply event");
                }
            }
            tracing::debug!("Monitor event pump stopped");
        });

        AttachHandle {
            bus: bus.clone(),
            subscriptions,
            pump,
        }
    }

    pub async fn detect_bottlenecks(&self) -> Result<Vec<Bottleneck>> {
        self.detect_bottlenecks_at(Utc::now()).await
    }

    /// Evaluate every rule at `now` and return all open bottlenecks
    pub async fn detect_bottlenecks_at(&self, now: DateTime<Utc>) -> Result<Vec<Bottleneck>> {
        let _guard = self.write_lock.lock().await;
        let mut found = Vec::new();

        for workflow in self.workflows.list().await? {
            if workflow.status != WorkflowStatus::Running {
                continue;
            }
            let Some(started_at) = workflow.started_at else {
                continue;
            };
            let elapsed_ms = (now - started_at).num_milliseconds().max(0) as f64;
            let limit_ms = workflow.metadata.expected_duration_ms as f64 * self.settings.timeout_factor;
            if elapsed_ms > limit_ms {
                found.push((
                    format!("workflow:{}:timeout", workflow.id),
                    BottleneckKind::WorkflowTimeout,
                    Severity::High,
                    workflow.id.clone(),
                    format!(
                        "workflow '{}' running for {:.0}s, expected {:.0}s",
                        workflow.metadata.name,
                        elapsed_ms / 1000.0,
                        workflow.metadata.expected_duration_ms as f64 / 1000.0
                    ),
                ));
            }
        }

        for agent in self.agents.iter() {
            if agent.load() > self.settings.overload_threshold {
                found.push((
                    format!("agent:{}:overload", agent.id),
                    BottleneckKind::AgentOverload,
                    Severity::Medium,
                    agent.id.clone(),
                    format!("{} tasks in flight", agent.load()),
                ));
            }
            if agent.error_count > self.settings.error_threshold {
                found.push((
                    format!("agent:{}:errors", agent.id),
                    BottleneckKind::AgentErrors,
                    Severity::High,
                    agent.id.clone(),
                    format!("{} failed tasks", agent.error_count),
                ));
            }
        }

        for (id, kind, severity, subject, description) in found {
            let opened = match self.bottlenecks.get(&id) {
                Some(existing) => !existing.is_open(),
                None => true,
            };
            if !opened {
                continue;
            }

            let bottleneck = Bottleneck {
                id: id.clone(),
                kind,
                severity,
                subject,
                description,
                detected_at: now,
                resolved_at: None,
            };
            self.bottlenecks.insert(id, bottleneck.clone());
            self.announce(&bottleneck);
        }

        Ok(self.open_bottlenecks())
    }

    fn announce(&self, bottleneck: &Bottleneck) {
        tracing::warn!(
            bottleneck_id = %bottleneck.id,
            kind = bottleneck.kind.as_str(),
            severity = bottleneck.severity.as_str(),
            "{}",
            bottleneck.description
        );
        self.metrics.record(
            Metric::counter("bottleneck.detected")
                .with_tag("kind", bottleneck.kind.as_str())
                .with_tag("severity", bottleneck.severity.as_str()),
        );
        if let Some(bus) = &self.bus {
            let data = serde_json::to_value(bottleneck).unwrap_or(Value::Null);
            bus.emit(Event::new(BOTTLENECK_DETECTED, &self.id, data));
        }
    }

    /// Open bottlenecks ordered by id
    pub fn open_bottlenecks(&self) -> Vec<Bottleneck> {
        let mut open: Vec<Bottleneck> = self
            .bottlenecks
            .iter()
            .filter(|b| b.is_open())
            .map(|b| b.value().clone())
            .collect();
        open.sort_by(|a, b| a.id.cmp(&b.id));
        open
    }

    /// Mark a bottleneck handled; it reopens if the condition persists
    pub fn resolve_bottleneck(&self, bottleneck_id: &str) -> Result<Bottleneck> {
        let mut entry = self
            .bottlenecks
            .get_mut(bottleneck_id)
            .ok_or_else(|| CoordinationError::not_found("bottleneck", bottleneck_id))?;
        if entry.resolved_at.is_none() {
            entry.resolved_at = Some(Utc::now());
            tracing::info!(bottleneck_id, "Bottleneck resolved");
        }
        Ok(entry.value().clone())
    }

    pub async fn generate_snapshot(&self) -> Result<DashboardSnapshot> {
        let workflows = self.workflows.list().await?;
        let mut agents: Vec<AgentState> = self.agents.iter().map(|a| a.value().clone()).collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        let bottlenecks = self.open_bottlenecks();

        let mut summary = DashboardSummary {
            total_workflows: workflows.len(),
            total_agents: agents.len(),
            open_bottlenecks: bottlenecks.len(),
            ..Default::default()
        };
        for workflow in &workflows {
            match workflow.status {
                WorkflowStatus::Pending => summary.pending += 1,
                WorkflowStatus::Running => summary.running += 1,
                WorkflowStatus::Paused => summary.paused += 1,
                WorkflowStatus::Completed => summary.completed += 1,
                WorkflowStatus::Failed => summary.failed += 1,
            }
        }
        if !workflows.is_empty() {
            summary.average_progress =
                workflows.iter().map(|w| w.progress).sum::<f64>() / workflows.len() as f64;
        }
        summary.busy_agents = agents.iter().filter(|a| a.status == AgentStatus::Busy).count();
        summary.errored_agents = agents.iter().filter(|a| a.status == AgentStatus::Error).count();

        Ok(DashboardSnapshot {
            generated_at: Utc::now(),
            workflows,
            agents,
            bottlenecks,
            summary,
        })
    }
}

fn workflow_id(event: &Event) -> Result<&str> {
    event.data["workflow_id"].as_str().ok_or_else(|| {
        CoordinationError::invalid_input(format!("{} event without workflow_id", event.event_type))
    })
}

/// Live subscription of a monitor to a bus
pub struct AttachHandle {
    bus: MessageBus,
    subscriptions: Vec<SubscriptionId>,
    pump: JoinHandle<()>,
}

impl AttachHandle {
    /// Unsubscribe and wait until every queued event is applied
    pub async fn detach(self) {
        for id in &self.subscriptions {
            self.bus.unsubscribe(*id);
        }
        if let Err(e) = self.pump.await {
            tracing::error!(error = %e, "Monitor event pump ended abnormally");
        }
    }
}

#[async_trait]
impl PeriodicJob for AggregationMonitor {
    fn name(&self) -> &str {
        "bottleneck-detection"
    }

    async fn run_once(&self) -> Result<()> {
        let open = self.detect_bottlenecks().await?;
        tracing::debug!(open = open.len(), "Bottleneck detection finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_telemetry::InMemorySink;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn agent(id: &str, tasks: usize, errors: u64) -> AgentState {
        let mut state = AgentState::new(id);
        state.current_tasks = (0..tasks).map(|i| format!("task-{}", i)).collect();
        state.error_count = errors;
        if tasks > 0 {
            state.status = AgentStatus::Busy;
        }
        state
    }

    async fn running(monitor: &AggregationMonitor, id: &str, expected_secs: u64) -> WorkflowState {
        monitor
            .register_workflow(id, WorkflowMetadata::new(id, Duration::from_secs(expected_secs)))
            .await
            .unwrap();
        monitor.start_workflow(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_workflow_timeout_detected_once() {
        let sink = InMemorySink::new();
        let monitor = AggregationMonitor::new(MonitorSettings::default()).with_metrics(Arc::new(sink.clone()));
        let started = running(&monitor, "deploy", 60).await;
        let t0 = started.started_at.unwrap();

        let early = monitor
            .detect_bottlenecks_at(t0 + ChronoDuration::seconds(89))
            .await
            .unwrap();
        assert!(early.is_empty());

        let first = monitor
            .detect_bottlenecks_at(t0 + ChronoDuration::seconds(91))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "workflow:deploy:timeout");
        assert_eq!(first[0].kind, BottleneckKind::WorkflowTimeout);
        assert_eq!(first[0].severity, Severity::High);

        let second = monitor
            .detect_bottlenecks_at(t0 + ChronoDuration::seconds(120))
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(sink.named("bottleneck.detected").len(), 1);
    }

    #[tokio::test]
    async fn test_agent_rules() {
        let monitor = AggregationMonitor::new(MonitorSettings::default());
        monitor.register_agent_state("calm", agent("calm", 5, 3));
        monitor.register_agent_state("busy", agent("busy", 6, 0));
        monitor.register_agent_state("flaky", agent("flaky", 0, 4));

        let found = monitor.detect_bottlenecks().await.unwrap();
        let ids: Vec<_> = found.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["agent:busy:overload", "agent:flaky:errors"]);
        assert_eq!(found[0].severity, Severity::Medium);
        assert_eq!(found[1].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_resolved_bottleneck_reopens_if_condition_persists() {
        let monitor = AggregationMonitor::new(MonitorSettings::default());
        monitor.register_agent_state("flaky", agent("flaky", 0, 9));
        monitor.detect_bottlenecks().await.unwrap();

        let resolved = monitor.resolve_bottleneck("agent:flaky:errors").unwrap();
        assert!(!resolved.is_open());
        assert!(monitor.open_bottlenecks().is_empty());

        // Condition cleared: stays resolved
        monitor.register_agent_state("flaky", agent("flaky", 0, 0));
        assert!(monitor.detect_bottlenecks().await.unwrap().is_empty());

        monitor.register_agent_state("flaky", agent("flaky", 0, 9));
        assert_eq!(monitor.detect_bottlenecks().await.unwrap().len(), 1);

        assert!(matches!(
            monitor.resolve_bottleneck("agent:ghost:errors"),
            Err(CoordinationError::ItemNotFound { kind: "bottleneck", .. })
        ));
    }

    #[tokio::test]
    async fn test_workflow_lifecycle_rules() {
        let monitor = AggregationMonitor::new(MonitorSettings::default());
        monitor
            .register_workflow("wf", WorkflowMetadata::new("release", Duration::from_secs(30)))
            .await
            .unwrap();

        assert!(matches!(
            monitor.register_workflow("wf", WorkflowMetadata::new("again", Duration::from_secs(30))).await,
            Err(CoordinationError::AlreadyTracked(_))
        ));
        assert!(matches!(
            monitor.update_progress("wf", 0.5).await,
            Err(CoordinationError::InvalidState { .. })
        ));

        monitor.start_workflow("wf").await.unwrap();
        assert_eq!(monitor.update_progress("wf", 1.7).await.unwrap().progress, 1.0);
        monitor.pause_workflow("wf").await.unwrap();
        let resumed = monitor.start_workflow("wf").await.unwrap();
        assert_eq!(resumed.status, WorkflowStatus::Running);

        let done = monitor.complete_workflow("wf").await.unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        assert!(done.finished_at.is_some());
        assert!(monitor.fail_workflow("wf", "late").await.is_err());
        assert!(matches!(
            monitor.start_workflow("nope").await,
            Err(CoordinationError::ItemNotFound { kind: "workflow", .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_expected_duration_is_rejected() {
        let monitor = AggregationMonitor::new(MonitorSettings::default());
        let result = monitor
            .register_workflow("wf", WorkflowMetadata::new("instant", Duration::ZERO))
            .await;
        assert!(matches!(result, Err(CoordinationError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_handle_event_drives_workflows_and_agents() {
        let monitor = AggregationMonitor::new(MonitorSettings::default());
        monitor
            .register_workflow("wf", WorkflowMetadata::new("review", Duration::from_secs(60)))
            .await
            .unwrap();

        monitor
            .handle_event(&Event::new(WORKFLOW_STARTED, "lead", json!({"workflow_id": "wf"})))
            .await
            .unwrap();
        monitor
            .handle_event(&Event::new(
                WORKFLOW_PROGRESS,
                "lead",
                json!({"workflow_id": "wf", "progress": 0.25}),
            ))
            .await
            .unwrap();
        monitor
            .handle_event(&Event::new(
                AGENT_STATE_CHANGED,
                "reviewer-1",
                serde_json::to_value(agent("reviewer-1", 1, 0)).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(monitor.workflow("wf").await.unwrap().progress, 0.25);
        assert_eq!(monitor.agent_state("reviewer-1").unwrap().load(), 1);

        let bad = monitor
            .handle_event(&Event::new(WORKFLOW_COMPLETED, "lead", json!({})))
            .await;
        assert!(matches!(bad, Err(CoordinationError::InvalidInput(_))));

        // Unrelated events are ignored
        monitor
            .handle_event(&Event::new("something_else", "x", Value::Null))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_summary() {
        let monitor = AggregationMonitor::new(MonitorSettings::default());
        running(&monitor, "a", 60).await;
        monitor.update_progress("a", 0.5).await.unwrap();
        monitor
            .register_workflow("b", WorkflowMetadata::new("b", Duration::from_secs(60)))
            .await
            .unwrap();
        running(&monitor, "c", 60).await;
        monitor.complete_workflow("c").await.unwrap();

        monitor.register_agent_state("w1", agent("w1", 2, 0));
        let mut broken = agent("w2", 0, 5);
        broken.status = AgentStatus::Error;
        monitor.register_agent_state("w2", broken);
        monitor.detect_bottlenecks().await.unwrap();

        let snapshot = monitor.generate_snapshot().await.unwrap();
        let s = &snapshot.summary;
        assert_eq!((s.total_workflows, s.pending, s.running, s.completed), (3, 1, 1, 1));
        assert!((s.average_progress - 0.5).abs() < 1e-12);
        assert_eq!((s.total_agents, s.busy_agents, s.errored_agents), (2, 1, 1));
        assert_eq!(s.open_bottlenecks, 1);
        assert_eq!(snapshot.agents[0].id, "w1");
    }

    #[tokio::test]
    async fn test_attach_applies_bus_events_in_order() {
        let bus = MessageBus::new();
        let monitor = Arc::new(AggregationMonitor::new(MonitorSettings::default()));
        monitor
            .register_workflow("wf", WorkflowMetadata::new("review", Duration::from_secs(60)))
            .await
            .unwrap();

        let handle = monitor.attach(&bus);
        assert_eq!(bus.subscriber_count(WORKFLOW_STARTED), 1);

        bus.emit(Event::new(WORKFLOW_STARTED, "lead", json!({"workflow_id": "wf"})));
        bus.emit(Event::new(WORKFLOW_PROGRESS, "lead", json!({"workflow_id": "wf", "progress": 0.4})));
        bus.emit(Event::new(WORKFLOW_COMPLETED, "lead", json!({"workflow_id": "wf"})));
        handle.detach().await;

        assert_eq!(bus.subscriber_count(WORKFLOW_STARTED), 0);
        let wf = monitor.workflow("wf").await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.progress, 1.0);
    }

    #[tokio::test]
    async fn test_new_bottleneck_is_announced() {
        let bus = MessageBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(BOTTLENECK_DETECTED, move |event| {
            sink.lock().unwrap().push(event.data["id"].as_str().unwrap_or_default().to_string());
            Ok(())
        });

        let monitor = AggregationMonitor::new(MonitorSettings::default()).with_bus(bus);
        monitor.register_agent_state("busy", agent("busy", 9, 0));
        monitor.detect_bottlenecks().await.unwrap();
        monitor.detect_bottlenecks().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["agent:busy:overload"]);
    }
}
