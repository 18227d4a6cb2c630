//! Several agents talking over one bus

use agent_comms::*;
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Answers every `ping` with a `pong` sent back over the bus
struct Ponger {
    id: String,
    bus: MessageBus,
}

#[async_trait]
impl MessageHandler for Ponger {
    async fn handle_message(&self, message: Message) -> Result<()> {
        match message.message_type.as_str() {
            "ping" => {
                self.bus
                    .send(&self.id, &message.from, "pong", message.payload.clone())
                    .await
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
struct Inbox {
    messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl MessageHandler for Inbox {
    async fn handle_message(&self, message: Message) -> Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[tokio::test]
async fn test_request_reply_between_agents() {
    let bus = MessageBus::new();
    let inbox = Arc::new(Inbox::default());
    bus.register("caller", inbox.clone());
    bus.register(
        "ponger",
        Arc::new(Ponger {
            id: "ponger".to_string(),
            bus: bus.clone(),
        }),
    );

    bus.send("caller", "ponger", "ping", json!({"seq": 1}))
        .await
        .unwrap();

    // Delivery is synchronous, so the reply is already in the inbox.
    let messages = inbox.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, "pong");
    assert_eq!(messages[0].from, "ponger");
    assert_eq!(messages[0].payload["seq"], 1);
}

#[tokio::test]
async fn test_events_reach_all_subscribers_until_unsubscribed() {
    let bus = MessageBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for name in ["dashboard", "escalation", "patterns"] {
        let seen = Arc::clone(&seen);
        ids.push(bus.subscribe("task_completed", move |event| {
            seen.lock().unwrap().push(format!("{name}:{}", event.data["task"]));
            Ok(())
        }));
    }

    let report = bus.emit(Event::new("task_completed", "worker-1", json!({"task": "t1"})));
    assert_eq!(report.delivered, 3);

    assert!(bus.unsubscribe(ids[1]));
    bus.emit(Event::new("task_completed", "worker-1", json!({"task": "t2"})));

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            "dashboard:\"t1\"",
            "escalation:\"t1\"",
            "patterns:\"t1\"",
            "dashboard:\"t2\"",
            "patterns:\"t2\"",
        ]
    );
}

#[tokio::test]
async fn test_registry_finds_reviewers() {
    let registry = AgentRegistry::new();
    registry.register(AgentEntry::new("coder-1", "coder", ["code"]));
    registry.register(AgentEntry::new("reviewer-1", "reviewer", ["review"]));
    registry.register(AgentEntry::new("reviewer-2", "reviewer", ["review"]));

    let reviewers = registry.find_by_capability("review");
    assert_eq!(reviewers.len(), 2);
    assert_eq!(registry.count(), 3);
}
