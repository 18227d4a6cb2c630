//! Agent Telemetry
//!
//! Metric values and the sinks they are recorded into. Export pipelines plug
//! in by implementing [`MetricsSink`] or by consuming a [`BroadcastSink`].
//!
//! # Example
//!
//! ```
//! use agent_telemetry::{InMemorySink, Metric, MetricsSink};
//!
//! let sink = InMemorySink::new();
//! sink.record(Metric::counter("bottleneck.detected").with_tag("kind", "agent_errors"));
//! assert_eq!(sink.named("bottleneck.detected").len(), 1);
//! ```

pub mod metric;
pub mod sink;

// Re-exports
pub use metric::{Metric, MetricKind};
pub use sink::{BroadcastSink, InMemorySink, MetricsSink, NoopSink};
