//! Metric data points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a metric value should be aggregated downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Monotonic count of occurrences
    Counter,
    /// Point-in-time level
    Gauge,
    /// One observation of a distribution
    Observation,
}

/// A single measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub kind: MetricKind,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            kind,
            tags: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Counter incremented by one
    pub fn counter(name: impl Into<String>) -> Self {
        Self::new(name, MetricKind::Counter, 1.0)
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Gauge, value)
    }

    pub fn observation(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Observation, value)
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}
