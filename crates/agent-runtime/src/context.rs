//! What a task handler knows about the agent running it

use agent_comms::{CommsError, EmitReport, Event, MessageBus};
use serde_json::Value;

/// Identity and communication channel handed to every handler call
#[derive(Clone)]
pub struct AgentContext {
    pub agent_id: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,

    /// Bus the agent is attached to, if any
    pub bus: Option<MessageBus>,
}

impl AgentContext {
    pub fn new(agent_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            capabilities: Vec::new(),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Send a message from this agent
    pub async fn send(
        &self,
        to: &str,
        message_type: &str,
        payload: Value,
    ) -> agent_comms::Result<()> {
        let bus = self
            .bus
            .as_ref()
            .ok_or_else(|| CommsError::delivery_failed(to, "agent is not attached to a bus"))?;
        bus.send(&self.agent_id, to, message_type, payload).await
    }

    /// Broadcast an event sourced from this agent
    ///
    /// Without a bus the event is dropped and an empty report returned.
    pub fn emit(&self, event_type: &str, data: Value, target: Option<&str>) -> EmitReport {
        let Some(bus) = &self.bus else {
            tracing::debug!(agent_id = %self.agent_id, event_type, "No bus attached, event dropped");
            return EmitReport::default();
        };
        let mut event = Event::new(event_type, &self.agent_id, data);
        if let Some(target) = target {
            event = event.with_target(target);
        }
        bus.emit(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_send_without_bus_fails() {
        let ctx = AgentContext::new("worker-1", "worker");
        let err = ctx.send("lead", "hello", Value::Null).await.unwrap_err();
        assert!(matches!(err, CommsError::DeliveryFailed { .. }));
    }

    #[test]
    fn test_emit_sets_source_and_target() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe("review_completed", move |event| {
            assert_eq!(event.source, "worker-1");
            assert_eq!(event.target.as_deref(), Some("lead"));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let ctx = AgentContext::new("worker-1", "worker").with_bus(bus);
        let report = ctx.emit("review_completed", Value::Null, Some("lead"));
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_without_bus_is_noop() {
        let ctx = AgentContext::new("worker-1", "worker");
        assert_eq!(ctx.emit("anything", Value::Null, None), EmitReport::default());
    }
}
