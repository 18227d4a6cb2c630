//! In-process message and event delivery
//!
//! Messages go to exactly one registered handler and the sender awaits the
//! outcome. Events go to every subscriber of their type, in subscription
//! order, on the emitting thread.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agent_core::panic_message;

use crate::{CommsError, Event, Message, Result};

/// Receives messages addressed to one agent
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: Message) -> Result<()>;
}

/// Receives events of the types it was subscribed to
///
/// Runs synchronously inside [`MessageBus::emit`]; keep it short.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> Result<()> {
        self(event)
    }
}

/// Handle returned by [`MessageBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Outcome of one [`MessageBus::emit`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Shared message and event channel
///
/// Cloning is cheap; clones share the same mailboxes and subscriptions.
#[derive(Clone)]
pub struct MessageBus {
    /// Agent mailboxes (agent_id -> handler)
    mailboxes: Arc<DashMap<String, Arc<dyn MessageHandler>>>,

    /// Subscriptions per event type, in subscription order
    subscriptions: Arc<DashMap<String, Vec<Subscription>>>,

    next_subscription: Arc<AtomicU64>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            mailboxes: Arc::new(DashMap::new()),
            subscriptions: Arc::new(DashMap::new()),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register an agent's mailbox, replacing any previous handler for the id
    pub fn register(&self, agent_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let agent_id = agent_id.into();
        tracing::debug!(agent_id = %agent_id, "Registered mailbox");
        self.mailboxes.insert(agent_id, handler);
    }

    /// Remove an agent's mailbox; returns whether one existed
    pub fn unregister(&self, agent_id: &str) -> bool {
        self.mailboxes.remove(agent_id).is_some()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.mailboxes.contains_key(agent_id)
    }

    /// Send a message and wait for the recipient's handler to finish
    ///
    /// Handler failures are returned to the sender; the bus never retries.
    pub async fn send(
        &self,
        from: &str,
        to: &str,
        message_type: &str,
        payload: Value,
    ) -> Result<()> {
        self.deliver(Message::new(from, to, message_type, payload))
            .await
    }

    /// Deliver a pre-built message
    pub async fn deliver(&self, message: Message) -> Result<()> {
        let handler = self
            .mailboxes
            .get(&message.to)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CommsError::AgentNotFound(message.to.clone()))?;

        let to = message.to.clone();
        tracing::trace!(
            from = %message.from,
            to = %to,
            message_type = %message.message_type,
            "Delivering message"
        );

        match AssertUnwindSafe(handler.handle_message(message))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CommsError::delivery_failed(to, e.to_string())),
            Err(payload) => Err(CommsError::delivery_failed(
                to,
                format!("handler panicked: {}", panic_message(payload.as_ref())),
            )),
        }
    }

    /// Subscribe a closure to one event type
    pub fn subscribe<F>(&self, event_type: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_handler(event_type, Arc::new(handler))
    }

    /// Subscribe a shared handler object
    pub fn subscribe_handler(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let event_type = event_type.into();
        tracing::debug!(event_type = %event_type, subscription = id.0, "Subscribed");
        self.subscriptions
            .entry(event_type)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Drop a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscriptions.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.id != id);
            removed |= entry.len() != before;
        }
        self.subscriptions.retain(|_, subs| !subs.is_empty());
        removed
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .get(event_type)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Run every handler subscribed to the event's type
    ///
    /// Each handler is isolated: an error or panic is logged and counted and
    /// the remaining handlers still run. Handlers may subscribe or emit
    /// re-entrantly.
    pub fn emit(&self, event: Event) -> EmitReport {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscriptions
            .get(&event.event_type)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        let mut report = EmitReport::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle_event(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(event_type = %event.event_type, error = %e, "Event handler failed");
                }
                Err(payload) => {
                    report.failed += 1;
                    tracing::warn!(
                        event_type = %event.event_type,
                        panic = %panic_message(payload.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }
        report
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
