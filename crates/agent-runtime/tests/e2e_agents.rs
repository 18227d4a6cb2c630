//! Agents running on a shared bus
//!
//! Run with:
//! ```bash
//! cargo test -p agent-runtime --test e2e_agents
//! ```

use agent_comms::{AgentRegistry, CommsError, Message, MessageBus, STATUS_REQUEST, STATUS_RESPONSE};
use agent_core::AgentConfig;
use agent_runtime::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn reviewer_config() -> AgentConfig {
    AgentConfig::new("reviewer", "Code Reviewer")
        .with_capabilities(["review"])
        .with_retry_attempts(1)
        .with_timeout(Duration::from_secs(10))
}

/// Collects messages arriving for a plain mailbox
#[derive(Default)]
struct Inbox {
    messages: Mutex<Vec<Message>>,
}

#[async_trait::async_trait]
impl agent_comms::MessageHandler for Inbox {
    async fn handle_message(&self, message: Message) -> agent_comms::Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[tokio::test]
async fn test_status_request_gets_state_snapshot() {
    let bus = MessageBus::new();
    let inbox = Arc::new(Inbox::default());
    bus.register("dashboard", inbox.clone());

    let agent = Agent::builder("reviewer-1", reviewer_config())
        .handler(TaskRouter::new().task("review", |_task, _ctx| async move {
            Ok::<_, TaskError>(json!({"approved": true}))
        }))
        .bus(bus.clone())
        .build()
        .await
        .unwrap();

    agent.submit(Task::new("review", json!({"pr": 1}))).await;
    bus.send("dashboard", "reviewer-1", STATUS_REQUEST, Value::Null)
        .await
        .unwrap();

    let messages = inbox.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, STATUS_RESPONSE);
    assert_eq!(messages[0].from, "reviewer-1");

    let state: AgentState = serde_json::from_value(messages[0].payload.clone()).unwrap();
    assert_eq!(state.id, "reviewer-1");
    assert_eq!(state.completed_count, 1);
    assert_eq!(state.status, AgentStatus::Idle);
}

#[tokio::test]
async fn test_handlers_coordinate_through_messages_and_events() {
    let bus = MessageBus::new();
    let registry = AgentRegistry::new();
    let completed = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&completed);
    bus.subscribe("review_completed", move |event| {
        seen.lock().unwrap().push(event.data["pr"].as_i64().unwrap_or_default());
        Ok(())
    });

    // The lead hands review requests to the reviewer as tasks.
    let reviewer = Agent::builder("reviewer-1", reviewer_config())
        .handler(TaskRouter::new().task("review", |task, ctx| async move {
            ctx.emit("review_completed", json!({"pr": task.payload["pr"]}), None);
            Ok::<_, TaskError>(Value::Null)
        }))
        .bus(bus.clone())
        .registry(registry.clone())
        .build()
        .await
        .unwrap();

    let worker = Arc::clone(&reviewer);
    let _lead = Agent::builder("lead", AgentConfig::new("lead", "Review Lead"))
        .handler(
            TaskRouter::new()
                .task("noop", |_task, _ctx| async move { Ok::<_, TaskError>(Value::Null) })
                .message("review_request", move |message, _ctx| {
                    let worker = Arc::clone(&worker);
                    async move {
                        let result = worker.submit(Task::new("review", message.payload)).await;
                        if result.success {
                            Ok(())
                        } else {
                            Err(CommsError::handler(result.error.unwrap_or_default()))
                        }
                    }
                }),
        )
        .bus(bus.clone())
        .registry(registry.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(registry.find_by_capability("review").len(), 1);

    for pr in [7, 8] {
        bus.send("author", "lead", "review_request", json!({"pr": pr}))
            .await
            .unwrap();
    }

    assert_eq!(*completed.lock().unwrap(), vec![7, 8]);
    assert_eq!(reviewer.state().completed_count, 2);
}

#[tokio::test]
async fn test_published_state_follows_each_submission() {
    let bus = MessageBus::new();
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    bus.subscribe(AGENT_STATE_CHANGED, move |event| {
        let state: AgentState = serde_json::from_value(event.data.clone())
            .map_err(CommsError::from)?;
        sink.lock().unwrap().push((state.status, state.completed_count, state.error_count));
        Ok(())
    });

    let agent = Agent::builder("worker-1", reviewer_config())
        .handler(
            TaskRouter::new()
                .task("ok", |_task, _ctx| async move { Ok::<_, TaskError>(Value::Null) })
                .task("bad", |_task, _ctx| async move {
                    Err::<Value, _>(TaskError::execution("broken input"))
                }),
        )
        .bus(bus)
        .publish_state(true)
        .build()
        .await
        .unwrap();

    agent.submit(Task::new("ok", Value::Null)).await;
    agent.submit(Task::new("bad", Value::Null)).await;
    agent.pause().unwrap();

    assert_eq!(
        *snapshots.lock().unwrap(),
        vec![
            (AgentStatus::Idle, 1, 0),
            (AgentStatus::Error, 1, 1),
            (AgentStatus::Paused, 1, 1),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_within_limit() {
    let agent = Agent::builder(
        "worker-1",
        reviewer_config().with_max_concurrent_tasks(3),
    )
    .handler(TaskRouter::new().task("sleep", |task, _ctx| async move {
        let secs = task.payload["secs"].as_u64().unwrap_or(1);
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok::<_, TaskError>(json!(secs))
    }))
    .build()
    .await
    .unwrap();

    let submissions = (1..=3).map(|secs| agent.submit(Task::new("sleep", json!({"secs": secs}))));
    let results = futures::future::join_all(submissions).await;

    assert!(results.iter().all(|r| r.success));
    let state = agent.state();
    assert_eq!(state.completed_count, 3);
    assert!(state.current_tasks.is_empty());
    assert_eq!(state.status, AgentStatus::Idle);
}
