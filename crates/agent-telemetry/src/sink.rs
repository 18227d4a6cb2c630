//! Metric sinks

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::Metric;

/// Destination for metrics
///
/// Recording must not block; sinks that export over the network should hand
/// metrics off (see [`BroadcastSink`]) rather than do I/O inline.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: Metric);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _metric: Metric) {}
}

/// Fans metrics out to async consumers over a broadcast channel
///
/// Metrics recorded while nobody is subscribed are dropped; slow receivers
/// lag and lose the oldest entries.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: Arc<broadcast::Sender<Metric>>,
}

impl BroadcastSink {
    /// Create a sink
    ///
    /// # Arguments
    /// * `capacity` - Channel capacity per receiver, at least 1
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Receive all metrics recorded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Metric> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MetricsSink for BroadcastSink {
    fn record(&self, metric: Metric) {
        tracing::trace!(name = %metric.name, value = metric.value, "Metric recorded");
        // No receivers is not an error
        let _ = self.sender.send(metric);
    }
}

/// Keeps every metric in memory, for tests and local inspection
#[derive(Clone, Default)]
pub struct InMemorySink {
    metrics: Arc<Mutex<Vec<Metric>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().clone()
    }

    /// Metrics with the given name, oldest first
    pub fn named(&self, name: &str) -> Vec<Metric> {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }
}

impl MetricsSink for InMemorySink {
    fn record(&self, metric: Metric) {
        self.metrics.lock().push(metric);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_to_multiple_subscribers() {
        let sink = BroadcastSink::new(16);
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        sink.record(Metric::gauge("agents.busy", 3.0));

        assert_eq!(first.recv().await.unwrap().value, 3.0);
        assert_eq!(second.recv().await.unwrap().name, "agents.busy");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let sink = BroadcastSink::new(0);
        let mut rx = sink.subscribe();

        sink.record(Metric::counter("first"));
        assert_eq!(rx.recv().await.unwrap().name, "first");
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let sink = BroadcastSink::default();
        sink.record(Metric::counter("dropped"));
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[test]
    fn test_in_memory_sink_filters_by_name() {
        let sink = InMemorySink::new();
        let shared: Arc<dyn MetricsSink> = Arc::new(sink.clone());

        shared.record(Metric::counter("a"));
        shared.record(Metric::counter("b"));
        shared.record(Metric::observation("a", 0.5));

        assert_eq!(sink.len(), 3);
        let named = sink.named("a");
        assert_eq!(named.len(), 2);
        assert_eq!(named[1].value, 0.5);
    }

    #[test]
    fn test_noop_sink() {
        NoopSink.record(Metric::counter("ignored"));
    }
}
