//! SLA tracking and multi-level escalation
//!
//! Each tracked item carries a deadline and an escalation level. Level 0 is
//! normal; a compliance check that finds the deadline passed moves it to
//! level 1, and explicit [`EscalationCoordinator::escalate`] calls move it on
//! to 2 and 3. Every level's actions run once, when the level is entered.
//!
//! | Level | Actions |
//! |-------|---------|
//! | 1 | `sla_breach` to assigned workers, add a backup worker, tracker comment |
//! | 2 | `escalation_lead` to the lead, `reassignment_requested` event, tracker status `escalated` |
//! | 3 | `escalation_emergency` to management, `emergency_escalation` event |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use agent_comms::{AgentRegistry, Event, MessageBus};
use agent_core::EscalationSettings;
use agent_store::{InMemoryRepository, Repository};

use crate::{CoordinationError, IssueTracker, PeriodicJob, Result};

pub const MAX_ESCALATION_LEVEL: u8 = 3;

pub const SLA_BREACH: &str = "sla_breach";
pub const ESCALATION_LEAD: &str = "escalation_lead";
pub const ESCALATION_EMERGENCY: &str = "escalation_emergency";

pub const SLA_ESCALATED: &str = "sla_escalated";
pub const REASSIGNMENT_REQUESTED: &str = "reassignment_requested";
pub const EMERGENCY_ESCALATION: &str = "emergency_escalation";

/// Tracker status set when an item reaches level 2
pub const ESCALATED_STATUS: &str = "escalated";

/// SLA state of one tracked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub item_id: String,
    pub sla_deadline: DateTime<Utc>,
    pub escalation_level: u8,
    pub assigned_workers: Vec<String>,
    pub tracked_at: DateTime<Utc>,

    #[serde(default)]
    pub last_escalated_at: Option<DateTime<Utc>>,
}

/// Result of a compliance check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    pub item_id: String,
    pub overdue: bool,
    /// Not yet overdue but within the at-risk window
    pub at_risk: bool,
    pub level: u8,
    pub deadline: DateTime<Utc>,
}

/// Outcome of one sweep over all tracked items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub checked: usize,
    pub escalated: usize,
    pub at_risk: usize,
    pub errors: usize,
}

/// Owns SLA records and runs escalation actions
///
/// A level change is persisted under the write lock; its notifications go
/// out after the lock is released, so message handlers may call back into
/// the coordinator.
pub struct EscalationCoordinator {
    id: String,
    settings: EscalationSettings,
    records: Arc<dyn Repository<EscalationRecord>>,
    bus: MessageBus,
    registry: AgentRegistry,
    tracker: Arc<dyn IssueTracker>,
    /// Serializes read-modify-write cycles on records
    write_lock: Mutex<()>,
}

/// A persisted level change whose actions have not run yet
struct Escalation {
    record: EscalationRecord,
    from: u8,
    backup: Option<String>,
}

impl EscalationCoordinator {
    pub fn new(
        settings: EscalationSettings,
        bus: MessageBus,
        registry: AgentRegistry,
        tracker: Arc<dyn IssueTracker>,
    ) -> Self {
        Self {
            id: "escalation-coordinator".to_string(),
            settings,
            records: Arc::new(InMemoryRepository::new("escalations")),
            bus,
            registry,
            tracker,
            write_lock: Mutex::new(()),
        }
    }

    /// Sender id used for messages and events
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_repository(mut self, records: Arc<dyn Repository<EscalationRecord>>) -> Self {
        self.records = records;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start tracking an item against a deadline
    pub async fn track(
        &self,
        item_id: &str,
        deadline: DateTime<Utc>,
        assigned_workers: Vec<String>,
    ) -> Result<EscalationRecord> {
        let _guard = self.write_lock.lock().await;
        if self.records.contains(item_id).await? {
            return Err(CoordinationError::AlreadyTracked(item_id.to_string()));
        }

        let record = EscalationRecord {
            item_id: item_id.to_string(),
            sla_deadline: deadline,
            escalation_level: 0,
            assigned_workers,
            tracked_at: Utc::now(),
            last_escalated_at: None,
        };
        self.records.put(item_id, record.clone()).await?;
        tracing::info!(item_id, deadline = %deadline, "Tracking SLA");
        Ok(record)
    }

    pub async fn get(&self, item_id: &str) -> Result<Option<EscalationRecord>> {
        Ok(self.records.get(item_id).await?)
    }

    /// All tracked records, ordered by item id
    pub async fn tracked(&self) -> Result<Vec<EscalationRecord>> {
        Ok(self.records.list().await?)
    }

    pub async fn check_compliance(&self, item_id: &str) -> Result<ComplianceStatus> {
        self.check_compliance_at(item_id, Utc::now()).await
    }

    /// Evaluate an item at `now`, escalating to level 1 on a fresh breach
    pub async fn check_compliance_at(&self, item_id: &str, now: DateTime<Utc>) -> Result<ComplianceStatus> {
        let guard = self.write_lock.lock().await;
        let record = self.load(item_id).await?;

        let overdue = now > record.sla_deadline;
        let at_risk = !overdue
            && (record.sla_deadline - now)
                .to_std()
                .map(|remaining| remaining <= self.settings.at_risk_window())
                .unwrap_or(false);

        let escalation = if overdue && record.escalation_level == 0 {
            tracing::warn!(item_id, deadline = %record.sla_deadline, "SLA breached");
            self.advance(record.clone(), now).await?
        } else {
            None
        };
        drop(guard);

        let record = match escalation {
            Some(escalation) => {
                self.deliver(&escalation).await;
                escalation.record
            }
            None => record,
        };
        Ok(ComplianceStatus {
            item_id: record.item_id,
            overdue,
            at_risk,
            level: record.escalation_level,
            deadline: record.sla_deadline,
        })
    }

    /// Move an item up one level; a no-op at the maximum
    pub async fn escalate(&self, item_id: &str) -> Result<EscalationRecord> {
        let guard = self.write_lock.lock().await;
        let record = self.load(item_id).await?;
        let Some(escalation) = self.advance(record.clone(), Utc::now()).await? else {
            return Ok(record);
        };
        drop(guard);

        self.deliver(&escalation).await;
        Ok(escalation.record)
    }

    /// Stop tracking an item whose work is done
    pub async fn complete(&self, item_id: &str) -> Result<EscalationRecord> {
        let _guard = self.write_lock.lock().await;
        let record = self
            .records
            .delete(item_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found("tracked item", item_id))?;
        tracing::info!(item_id, level = record.escalation_level, "SLA tracking completed");
        Ok(record)
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Check every tracked item; one failing item does not stop the rest
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let records = self.records.list().await?;
        let mut report = SweepReport::default();

        for record in records {
            report.checked += 1;
            match self.check_compliance_at(&record.item_id, now).await {
                Ok(status) => {
                    if status.level > record.escalation_level {
                        report.escalated += 1;
                    }
                    if status.at_risk {
                        report.at_risk += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(item_id = %record.item_id, error = %e, "Compliance check failed");
                }
            }
        }

        tracing::debug!(
            checked = report.checked,
            escalated = report.escalated,
            at_risk = report.at_risk,
            errors = report.errors,
            "SLA sweep finished"
        );
        Ok(report)
    }

    async fn load(&self, item_id: &str) -> Result<EscalationRecord> {
        self.records
            .get(item_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found("tracked item", item_id))
    }

    /// Bump the level and persist it; `None` at the maximum
    ///
    /// Caller must hold the write lock.
    async fn advance(&self, mut record: EscalationRecord, now: DateTime<Utc>) -> Result<Option<Escalation>> {
        if record.escalation_level >= MAX_ESCALATION_LEVEL {
            tracing::debug!(item_id = %record.item_id, "Already at maximum escalation level");
            return Ok(None);
        }

        let from = record.escalation_level;
        record.escalation_level += 1;
        record.last_escalated_at = Some(now);

        let backup = if record.escalation_level == 1 {
            self.pick_backup(&record)
        } else {
            None
        };
        if let Some(backup) = &backup {
            record.assigned_workers.push(backup.clone());
        }

        self.records.put(&record.item_id, record.clone()).await?;
        tracing::warn!(
            item_id = %record.item_id,
            from,
            to = record.escalation_level,
            "SLA escalated"
        );
        Ok(Some(Escalation { record, from, backup }))
    }

    /// Run the actions of the level just entered; must not hold the write lock
    async fn deliver(&self, escalation: &Escalation) {
        let record = &escalation.record;
        match record.escalation_level {
            1 => self.breach_actions(record, escalation.backup.as_deref()).await,
            2 => self.lead_actions(record).await,
            _ => self.emergency_actions(record).await,
        }

        self.emit(
            SLA_ESCALATED,
            json!({
                "item_id": record.item_id,
                "from_level": escalation.from,
                "level": record.escalation_level,
                "deadline": record.sla_deadline,
            }),
        );
    }

    fn pick_backup(&self, record: &EscalationRecord) -> Option<String> {
        self.registry
            .find_by_capability(&self.settings.backup_capability)
            .into_iter()
            .map(|entry| entry.id)
            .find(|id| !record.assigned_workers.contains(id))
    }

    async fn breach_actions(&self, record: &EscalationRecord, backup: Option<&str>) {
        let payload = self.payload(record);
        for worker in &record.assigned_workers {
            self.notify(worker, SLA_BREACH, payload.clone()).await;
        }

        let comment = match backup {
            Some(backup) => format!("SLA deadline {} missed; {} added as backup", record.sla_deadline, backup),
            None => format!("SLA deadline {} missed; no backup available", record.sla_deadline),
        };
        if let Err(e) = self.tracker.add_comment(&record.item_id, &comment).await {
            tracing::warn!(item_id = %record.item_id, error = %e, "Could not comment on issue");
        }
    }

    async fn lead_actions(&self, record: &EscalationRecord) {
        self.notify(&self.settings.lead_id, ESCALATION_LEAD, self.payload(record)).await;
        self.emit(REASSIGNMENT_REQUESTED, self.payload(record));

        if let Err(e) = self.tracker.update_status(&record.item_id, ESCALATED_STATUS).await {
            tracing::warn!(item_id = %record.item_id, error = %e, "Could not update issue status");
        }
    }

    async fn emergency_actions(&self, record: &EscalationRecord) {
        self.notify(&self.settings.management_id, ESCALATION_EMERGENCY, self.payload(record)).await;
        self.emit(EMERGENCY_ESCALATION, self.payload(record));
    }

    fn payload(&self, record: &EscalationRecord) -> Value {
        json!({
            "item_id": record.item_id,
            "deadline": record.sla_deadline,
            "level": record.escalation_level,
            "assigned_workers": record.assigned_workers,
        })
    }

    async fn notify(&self, to: &str, message_type: &str, payload: Value) {
        if let Err(e) = self.bus.send(&self.id, to, message_type, payload).await {
            tracing::warn!(to, message_type, error = %e, "Escalation notification failed");
        }
    }

    fn emit(&self, event_type: &str, data: Value) {
        self.bus.emit(Event::new(event_type, &self.id, data));
    }
}

#[async_trait]
impl PeriodicJob for EscalationCoordinator {
    fn name(&self) -> &str {
        "sla-compliance"
    }

    async fn run_once(&self) -> Result<()> {
        self.sweep().await.map(|_| ())
    }
}
