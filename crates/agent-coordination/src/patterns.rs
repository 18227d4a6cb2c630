//! Pattern effectiveness tracking and evolution
//!
//! Every application of a pattern ends in an outcome. The outcome is turned
//! into an effectiveness value in `[0, 1]` and folded into the pattern's
//! score with an exponential moving average. Patterns that keep
//! underperforming are not edited: [`PatternTracker::evolve`] creates a
//! derived version and supersedes the original, so lineages can be compared
//! and rolled back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use agent_comms::{Event, MessageBus};
use agent_core::PatternSettings;
use agent_store::{InMemoryRepository, Repository};
use agent_telemetry::{Metric, MetricsSink, NoopSink};

use crate::{CoordinationError, PeriodicJob, Result};

/// Score given to a newly registered pattern
pub const INITIAL_SCORE: f64 = 0.5;

pub const PATTERN_EVOLVED: &str = "pattern_evolved";

const OUTCOME_WEIGHT: f64 = 0.6;
const DURATION_WEIGHT: f64 = 0.2;
const SATISFACTION_WEIGHT: f64 = 0.2;

/// How an application of a pattern ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

impl Outcome {
    pub fn value(&self) -> f64 {
        match self {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Failure => 0.0,
        }
    }
}

/// Optional signals reported with an outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    pub duration_ms: Option<u64>,
    /// Satisfaction in `[0, 1]`; out-of-range values are clamped
    pub satisfaction: Option<f64>,
}

/// Effectiveness of one application
///
/// Weighted mean of the signals that are present: the outcome class always,
/// the duration ratio `expected / actual` (capped at 1) when both durations
/// are known, and the satisfaction signal when supplied.
pub fn effectiveness(outcome: Outcome, metrics: &OutcomeMetrics, expected_duration_ms: Option<u64>) -> f64 {
    let mut total = OUTCOME_WEIGHT * outcome.value();
    let mut weight = OUTCOME_WEIGHT;

    if let (Some(expected), Some(actual)) = (expected_duration_ms, metrics.duration_ms) {
        let ratio = if actual == 0 {
            1.0
        } else {
            (expected as f64 / actual as f64).min(1.0)
        };
        total += DURATION_WEIGHT * ratio;
        weight += DURATION_WEIGHT;
    }

    if let Some(satisfaction) = metrics.satisfaction.filter(|s| s.is_finite()) {
        total += SATISFACTION_WEIGHT * satisfaction.clamp(0.0, 1.0);
        weight += SATISFACTION_WEIGHT;
    }

    total / weight
}

/// Exponential moving average step
pub fn ema(score: f64, value: f64, smoothing: f64) -> f64 {
    smoothing * score + (1.0 - smoothing) * value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Superseded { by: String },
    RolledBack,
}

/// One recorded outcome kept for evolution decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub outcome: Outcome,
    pub effectiveness: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub parent_id: Option<String>,
    pub effectiveness_score: f64,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub components: Vec<String>,
    pub tags: BTreeSet<String>,
    pub parameters: BTreeMap<String, f64>,
    pub expected_duration_ms: Option<u64>,
    pub recent: VecDeque<OutcomeSample>,
    pub status: PatternStatus,
    pub created_at: DateTime<Utc>,
}

impl PatternRecord {
    pub fn is_active(&self) -> bool {
        self.status == PatternStatus::Active
    }

    /// Fraction of recent samples that were full successes
    pub fn recent_success_rate(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let successes = self
            .recent
            .iter()
            .filter(|s| s.outcome == Outcome::Success)
            .count();
        Some(successes as f64 / self.recent.len() as f64)
    }

    /// Mean effectiveness of recent samples
    pub fn recent_average(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        Some(self.recent.iter().map(|s| s.effectiveness).sum::<f64>() / self.recent.len() as f64)
    }
}

/// Input for registering a pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPattern {
    pub name: String,
    pub components: Vec<String>,
    pub tags: BTreeSet<String>,
    pub parameters: BTreeMap<String, f64>,
    pub expected_duration_ms: Option<u64>,
}

impl NewPattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn expected_duration_ms(mut self, ms: u64) -> Self {
        self.expected_duration_ms = Some(ms);
        self
    }
}

/// What a recommendation is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendContext {
    pub tags: BTreeSet<String>,
    pub limit: usize,
}

impl Default for RecommendContext {
    fn default() -> Self {
        Self {
            tags: BTreeSet::new(),
            limit: 10,
        }
    }
}

impl RecommendContext {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub pattern: PatternRecord,
    pub relevance: f64,
    pub rank: f64,
}

/// A pattern application awaiting its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub pattern_id: String,
    pub context: Value,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnchangedReason {
    NotActive,
    InsufficientSamples { have: usize, need: usize },
    Performing { success_rate: f64, average: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvolutionOutcome {
    Evolved { parent: String, child: PatternRecord },
    Unchanged(UnchangedReason),
}

/// Result of evaluating every active pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    pub evaluated: usize,
    /// `(parent, child)` id pairs
    pub evolved: Vec<(String, String)>,
    pub errors: usize,
}

/// Pattern library with effectiveness scoring
pub struct PatternTracker {
    id: String,
    settings: PatternSettings,
    patterns: Arc<dyn Repository<PatternRecord>>,
    applications: DashMap<String, Application>,
    metrics: Arc<dyn MetricsSink>,
    bus: Option<MessageBus>,
    write_lock: Mutex<()>,
}

impl PatternTracker {
    pub fn new(settings: PatternSettings) -> Self {
        Self {
            id: "pattern-tracker".to_string(),
            settings,
            patterns: Arc::new(InMemoryRepository::new("patterns")),
            applications: DashMap::new(),
            metrics: Arc::new(NoopSink),
            bus: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_repository(mut self, patterns: Arc<dyn Repository<PatternRecord>>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Announce evolutions on a bus
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn register(&self, pattern: NewPattern) -> Result<PatternRecord> {
        let record = PatternRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: pattern.name,
            version: 1,
            parent_id: None,
            effectiveness_score: INITIAL_SCORE,
            usage_count: 0,
            last_used: None,
            components: pattern.components,
            tags: pattern.tags,
            parameters: pattern.parameters,
            expected_duration_ms: pattern.expected_duration_ms,
            recent: VecDeque::new(),
            status: PatternStatus::Active,
            created_at: Utc::now(),
        };
        self.patterns.put(&record.id, record.clone()).await?;
        tracing::info!(pattern_id = %record.id, name = %record.name, "Pattern registered");
        Ok(record)
    }

    pub async fn get(&self, pattern_id: &str) -> Result<PatternRecord> {
        self.patterns
            .get(pattern_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found("pattern", pattern_id))
    }

    /// Active patterns ranked for a context
    pub async fn recommend(&self, context: &RecommendContext) -> Result<Vec<Recommendation>> {
        let weight = self.settings.relevance_weight;
        let mut ranked: Vec<Recommendation> = self
            .patterns
            .list()
            .await?
            .into_iter()
            .filter(PatternRecord::is_active)
            .map(|pattern| {
                let relevance = relevance(&pattern, context);
                let rank = (1.0 - weight) * pattern.effectiveness_score + weight * relevance;
                Recommendation {
                    pattern,
                    relevance,
                    rank,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.rank
                .total_cmp(&a.rank)
                .then_with(|| b.pattern.usage_count.cmp(&a.pattern.usage_count))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        ranked.truncate(context.limit);
        Ok(ranked)
    }

    /// Record that a pattern is being used; returns the application id
    pub async fn apply(&self, pattern_id: &str, context: Value) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let mut pattern = self.get(pattern_id).await?;
        if !pattern.is_active() {
            return Err(CoordinationError::invalid_state(
                "pattern",
                pattern_id,
                "only active patterns can be applied",
            ));
        }

        let now = Utc::now();
        pattern.usage_count += 1;
        pattern.last_used = Some(now);
        self.patterns.put(pattern_id, pattern).await?;

        let application = Application {
            id: uuid::Uuid::new_v4().to_string(),
            pattern_id: pattern_id.to_string(),
            context,
            applied_at: now,
        };
        let application_id = application.id.clone();
        self.applications.insert(application_id.clone(), application);

        tracing::debug!(pattern_id, application_id = %application_id, "Pattern applied");
        Ok(application_id)
    }

    pub fn pending_applications(&self) -> usize {
        self.applications.len()
    }

    /// Drop an application whose outcome will never be reported
    ///
    /// The pattern's score is left untouched.
    pub fn abandon(&self, application_id: &str) -> Result<Application> {
        let (_, application) = self
            .applications
            .remove(application_id)
            .ok_or_else(|| CoordinationError::not_found("application", application_id))?;
        tracing::debug!(
            pattern_id = %application.pattern_id,
            application_id,
            "Pattern application abandoned"
        );
        Ok(application)
    }

    /// Fold an application's outcome into its pattern's score
    ///
    /// Each application can be reported once.
    pub async fn record_outcome(
        &self,
        application_id: &str,
        outcome: Outcome,
        metrics: OutcomeMetrics,
    ) -> Result<PatternRecord> {
        let _guard = self.write_lock.lock().await;
        let (_, application) = self
            .applications
            .remove(application_id)
            .ok_or_else(|| CoordinationError::not_found("application", application_id))?;

        let mut pattern = self.get(&application.pattern_id).await?;
        let value = effectiveness(outcome, &metrics, pattern.expected_duration_ms);
        let previous = pattern.effectiveness_score;
        pattern.effectiveness_score = ema(previous, value, self.settings.smoothing);

        pattern.recent.push_back(OutcomeSample {
            outcome,
            effectiveness: value,
            recorded_at: Utc::now(),
        });
        while pattern.recent.len() > self.settings.recent_window {
            pattern.recent.pop_front();
        }
        self.patterns.put(&pattern.id, pattern.clone()).await?;

        self.metrics.record(
            Metric::observation("pattern.effectiveness", value)
                .with_tag("pattern_id", &pattern.id)
                .with_tag("outcome", format!("{:?}", outcome).to_lowercase()),
        );
        tracing::debug!(
            pattern_id = %pattern.id,
            application_id,
            effectiveness = value,
            from = previous,
            to = pattern.effectiveness_score,
            "Pattern score updated"
        );
        Ok(pattern)
    }

    /// Derive a new version of an underperforming pattern
    pub async fn evolve(&self, pattern_id: &str) -> Result<EvolutionOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut parent = self.get(pattern_id).await?;

        if !parent.is_active() {
            return Ok(EvolutionOutcome::Unchanged(UnchangedReason::NotActive));
        }
        if parent.recent.len() < self.settings.min_samples {
            return Ok(EvolutionOutcome::Unchanged(UnchangedReason::InsufficientSamples {
                have: parent.recent.len(),
                need: self.settings.min_samples,
            }));
        }

        let success_rate = parent.recent_success_rate().unwrap_or(0.0);
        let average = parent.recent_average().unwrap_or(0.0);
        if success_rate >= self.settings.success_threshold && average >= self.settings.score_threshold {
            return Ok(EvolutionOutcome::Unchanged(UnchangedReason::Performing {
                success_rate,
                average,
            }));
        }

        let factor = 1.0 + self.settings.parameter_adjustment;
        let child = PatternRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: parent.name.clone(),
            version: parent.version + 1,
            parent_id: Some(parent.id.clone()),
            effectiveness_score: parent.effectiveness_score,
            usage_count: 0,
            last_used: None,
            components: parent.components.clone(),
            tags: parent.tags.clone(),
            parameters: parent
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), v * factor))
                .collect(),
            expected_duration_ms: parent.expected_duration_ms,
            recent: VecDeque::new(),
            status: PatternStatus::Active,
            created_at: Utc::now(),
        };

        self.patterns.put(&child.id, child.clone()).await?;
        parent.status = PatternStatus::Superseded {
            by: child.id.clone(),
        };
        self.patterns.put(&parent.id, parent.clone()).await?;

        tracing::info!(
            pattern_id = %parent.id,
            child_id = %child.id,
            version = child.version,
            success_rate,
            average,
            "Pattern evolved"
        );
        self.metrics
            .record(Metric::counter("pattern.evolved").with_tag("pattern_id", &parent.id));
        if let Some(bus) = &self.bus {
            bus.emit(Event::new(
                PATTERN_EVOLVED,
                &self.id,
                json!({"parent": parent.id, "child": child.id, "version": child.version}),
            ));
        }

        Ok(EvolutionOutcome::Evolved {
            parent: parent.id,
            child,
        })
    }

    /// Evaluate every active pattern
    pub async fn evolve_all(&self) -> Result<EvolutionReport> {
        let candidates: Vec<String> = self
            .patterns
            .list()
            .await?
            .into_iter()
            .filter(PatternRecord::is_active)
            .map(|p| p.id)
            .collect();

        let mut report = EvolutionReport::default();
        for pattern_id in candidates {
            report.evaluated += 1;
            match self.evolve(&pattern_id).await {
                Ok(EvolutionOutcome::Evolved { parent, child }) => {
                    report.evolved.push((parent, child.id));
                }
                Ok(EvolutionOutcome::Unchanged(_)) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(pattern_id = %pattern_id, error = %e, "Pattern evaluation failed");
                }
            }
        }
        Ok(report)
    }

    /// The pattern followed by its ancestors, oldest last
    pub async fn lineage(&self, pattern_id: &str) -> Result<Vec<PatternRecord>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(pattern_id.to_string());

        while let Some(id) = next {
            if !seen.insert(id.clone()) {
                break;
            }
            let record = self.get(&id).await?;
            next = record.parent_id.clone();
            chain.push(record);
        }
        Ok(chain)
    }

    /// Undo an evolution: reactivate the parent and retire `child_id`
    pub async fn rollback(&self, child_id: &str) -> Result<PatternRecord> {
        let _guard = self.write_lock.lock().await;
        let mut child = self.get(child_id).await?;
        let parent_id = child
            .parent_id
            .clone()
            .ok_or_else(|| CoordinationError::invalid_state("pattern", child_id, "has no parent"))?;
        if !child.is_active() {
            return Err(CoordinationError::invalid_state(
                "pattern",
                child_id,
                "only the active version can be rolled back",
            ));
        }

        let mut parent = self.get(&parent_id).await?;
        if parent.status != (PatternStatus::Superseded { by: child.id.clone() }) {
            return Err(CoordinationError::invalid_state(
                "pattern",
                &parent_id,
                "not superseded by this version",
            ));
        }

        parent.status = PatternStatus::Active;
        child.status = PatternStatus::RolledBack;
        let rolled_back_id = child.id.clone();
        self.patterns.put(&rolled_back_id, child).await?;
        self.patterns.put(&parent.id, parent.clone()).await?;

        tracing::info!(pattern_id = %parent.id, child_id, "Pattern rolled back");
        Ok(parent)
    }
}

fn relevance(pattern: &PatternRecord, context: &RecommendContext) -> f64 {
    if context.tags.is_empty() {
        return 1.0;
    }
    let matching = context.tags.intersection(&pattern.tags).count();
    matching as f64 / context.tags.len() as f64
}

#[async_trait]
impl PeriodicJob for PatternTracker {
    fn name(&self) -> &str {
        "pattern-evolution"
    }

    async fn run_once(&self) -> Result<()> {
        let report = self.evolve_all().await?;
        if !report.evolved.is_empty() {
            tracing::info!(evolved = report.evolved.len(), "Pattern evolution pass finished");
        }
        Ok(())
    }
}
