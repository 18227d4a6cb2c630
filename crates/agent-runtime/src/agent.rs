//! Agent execution kernel
//!
//! An [`Agent`] runs tasks through its [`TaskHandler`] with a per-attempt
//! timeout, bounded retries and exponential backoff, and keeps an
//! [`AgentState`] that always reflects finished work, even when a caller
//! drops a submission halfway.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::time::Instant;

use agent_comms::{
    AgentEntry, AgentRegistry, CommsError, EmitReport, Message, MessageBus, MessageHandler,
    STATUS_REQUEST, STATUS_RESPONSE,
};
use agent_core::{panic_message, AgentConfig};

use crate::{
    AgentContext, AgentState, AgentStatus, Result, RuntimeError, Task, TaskError, TaskHandler,
    TaskResult,
};

/// Event emitted after each submission when state publishing is enabled
pub const AGENT_STATE_CHANGED: &str = "agent_state_changed";

/// Why an agent would turn a task away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    Paused,
    AtCapacity,
}

/// Answer to "can this agent take another task right now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    Accept,
    Refuse { reason: RefusalReason },
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

/// A configured worker that executes tasks
pub struct Agent {
    id: String,
    config: AgentConfig,
    handler: Arc<dyn TaskHandler>,
    context: AgentContext,
    state: Mutex<AgentState>,
    publish_state: bool,
}

impl Agent {
    /// Create a new agent builder
    pub fn builder(id: impl Into<String>, config: AgentConfig) -> AgentBuilder {
        AgentBuilder::new(id, config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Copy of the current state
    pub fn state(&self) -> AgentState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    pub fn admission(&self) -> Admission {
        let state = self.state.lock();
        Self::admission_for(&state, self.config.max_concurrent_tasks)
    }

    fn admission_for(state: &AgentState, max: usize) -> Admission {
        if state.status == AgentStatus::Paused {
            Admission::Refuse {
                reason: RefusalReason::Paused,
            }
        } else if state.is_at_capacity(max) {
            Admission::Refuse {
                reason: RefusalReason::AtCapacity,
            }
        } else {
            Admission::Accept
        }
    }

    /// True iff the agent is not paused and below its task limit
    pub fn can_accept_task(&self) -> bool {
        self.admission().is_accept()
    }

    /// Run a task to completion
    ///
    /// Always yields exactly one result. Failures are reported in the
    /// result, never as an `Err`. A task submitted while the agent is at
    /// capacity, or while a task with the same id is still running, is not
    /// run and yields a failure without touching the counters; pausing is advisory here, use [`Agent::try_submit`] to
    /// have it enforced.
    pub async fn submit(&self, task: Task) -> TaskResult {
        let started = Instant::now();

        let mut guard = match TaskGuard::begin(self, &task.id) {
            Ok(guard) => guard,
            Err(err) => {
                tracing::warn!(agent_id = %self.id, task_id = %task.id, "Task refused: {}", err);
                return TaskResult::failure(&task.id, err.to_string(), started.elapsed(), 0);
            }
        };

        tracing::debug!(
            agent_id = %self.id,
            task_id = %task.id,
            task_type = %task.task_type,
            "Task started"
        );

        let result = match self.run_attempts(&task).await {
            Ok((data, attempts)) => {
                guard.succeeded();
                tracing::info!(
                    agent_id = %self.id,
                    task_id = %task.id,
                    attempts,
                    "Task completed"
                );
                TaskResult::success(&task.id, data, started.elapsed(), attempts)
            }
            Err((err, attempts)) => {
                guard.failed();
                tracing::error!(
                    agent_id = %self.id,
                    task_id = %task.id,
                    attempts,
                    error = %err,
                    "Task failed"
                );
                TaskResult::failure(&task.id, err.to_string(), started.elapsed(), attempts)
            }
        };
        drop(guard);

        if self.publish_state {
            self.broadcast_state();
        }
        result
    }

    /// Like [`Agent::submit`] but refuses up front when paused, at capacity
    /// or already running a task with the same id
    pub async fn try_submit(&self, task: Task) -> Result<TaskResult> {
        {
            let state = self.state.lock();
            if state.current_tasks.contains(&task.id) {
                return Err(RuntimeError::DuplicateTask {
                    agent_id: self.id.clone(),
                    task_id: task.id.clone(),
                });
            }
            match Self::admission_for(&state, self.config.max_concurrent_tasks) {
                Admission::Accept => {}
                Admission::Refuse {
                    reason: RefusalReason::Paused,
                } => return Err(RuntimeError::Paused(self.id.clone())),
                Admission::Refuse {
                    reason: RefusalReason::AtCapacity,
                } => {
                    return Err(RuntimeError::CapacityExceeded {
                        agent_id: self.id.clone(),
                        current: state.load(),
                        max: self.config.max_concurrent_tasks,
                    })
                }
            }
        }
        Ok(self.submit(task).await)
    }

    async fn run_attempts(&self, task: &Task) -> std::result::Result<(Value, u32), (TaskError, u32)> {
        let max_attempts = self.config.retry_attempts.max(1);
        let mut backoff = self.backoff_policy();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.run_attempt(task).await {
                Ok(data) => return Ok((data, attempt)),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err((err, attempt));
            }
            if attempt >= max_attempts {
                let exhausted = TaskError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                };
                return Err((exhausted, attempt));
            }

            let delay = backoff.next_backoff().unwrap_or_else(|| self.config.backoff_max());
            tracing::warn!(
                agent_id = %self.id,
                task_id = %task.id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt, cancelled at the timeout
    async fn run_attempt(&self, task: &Task) -> std::result::Result<Value, TaskError> {
        let timeout = self.config.timeout();
        let work = AssertUnwindSafe(self.handler.process_task(task, &self.context)).catch_unwind();

        match tokio::time::timeout(timeout, work).await {
            Err(_) => Err(TaskError::Timeout(timeout)),
            Ok(Err(payload)) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Delays of base, 2*base, 4*base ... capped at the configured maximum
    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.backoff_base())
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.config.backoff_max())
            .with_max_elapsed_time(None)
            .build()
    }

    /// Stop accepting work; allowed from idle or error
    pub fn pause(&self) -> Result<()> {
        self.transition(AgentStatus::Paused, &[AgentStatus::Idle, AgentStatus::Error])
    }

    /// Leave the paused state
    ///
    /// Lands on `Busy` when tasks accepted while paused are still running.
    pub fn resume(&self) -> Result<()> {
        self.transition(AgentStatus::Idle, &[AgentStatus::Paused])
    }

    fn transition(&self, to: AgentStatus, allowed_from: &[AgentStatus]) -> Result<()> {
        let mut state = self.state.lock();
        let from = state.status;
        let to = if to == AgentStatus::Idle && !state.current_tasks.is_empty() {
            AgentStatus::Busy
        } else {
            to
        };
        if !allowed_from.contains(&from) {
            return Err(RuntimeError::InvalidTransition {
                agent_id: self.id.clone(),
                from,
                to,
            });
        }
        state.status = to;
        state.last_activity = Utc::now();
        drop(state);

        tracing::info!(agent_id = %self.id, %from, %to, "Agent status changed");
        if self.publish_state {
            self.broadcast_state();
        }
        Ok(())
    }

    /// Send a message from this agent over its bus
    pub async fn send_message(&self, to: &str, message_type: &str, payload: Value) -> Result<()> {
        self.context.send(to, message_type, payload).await?;
        Ok(())
    }

    /// Broadcast an event from this agent
    pub fn emit(&self, event_type: &str, data: Value, target: Option<&str>) -> EmitReport {
        self.context.emit(event_type, data, target)
    }

    fn broadcast_state(&self) {
        match serde_json::to_value(self.state()) {
            Ok(data) => {
                self.context.emit(AGENT_STATE_CHANGED, data, None);
            }
            Err(e) => {
                tracing::warn!(agent_id = %self.id, error = %e, "Could not serialize agent state")
            }
        }
    }

    async fn on_message(&self, message: Message) -> agent_comms::Result<()> {
        if message.is_type(STATUS_REQUEST) {
            let snapshot = serde_json::to_value(self.state())?;
            let reply = message.reply(STATUS_RESPONSE, snapshot);
            return match &self.context.bus {
                Some(bus) => bus.deliver(reply).await,
                None => Err(CommsError::delivery_failed(&message.from, "agent has no bus")),
            };
        }
        self.handler.handle_message(&message, &self.context).await
    }
}

/// Tracks one admitted task; bookkeeping happens on drop so that every exit
/// path, including a dropped future, leaves the state consistent
struct TaskGuard<'a> {
    agent: &'a Agent,
    task_id: String,
    succeeded: bool,
}

impl<'a> TaskGuard<'a> {
    /// Admit a task; refused at capacity or when its id is already in flight
    fn begin(agent: &'a Agent, task_id: &str) -> Result<Self> {
        let mut state = agent.state.lock();
        if state.current_tasks.contains(task_id) {
            return Err(RuntimeError::DuplicateTask {
                agent_id: agent.id.clone(),
                task_id: task_id.to_string(),
            });
        }
        if state.is_at_capacity(agent.config.max_concurrent_tasks) {
            return Err(RuntimeError::CapacityExceeded {
                agent_id: agent.id.clone(),
                current: state.load(),
                max: agent.config.max_concurrent_tasks,
            });
        }
        state.current_tasks.insert(task_id.to_string());
        if state.status != AgentStatus::Paused {
            state.status = AgentStatus::Busy;
        }
        state.last_activity = Utc::now();
        Ok(Self {
            agent,
            task_id: task_id.to_string(),
            succeeded: false,
        })
    }

    fn succeeded(&mut self) {
        self.succeeded = true;
    }

    fn failed(&mut self) {
        self.succeeded = false;
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.agent.state.lock();
        state.current_tasks.remove(&self.task_id);
        state.last_activity = Utc::now();

        if self.succeeded {
            state.completed_count += 1;
            if state.status != AgentStatus::Paused {
                state.status = if state.current_tasks.is_empty() {
                    AgentStatus::Idle
                } else {
                    AgentStatus::Busy
                };
            }
        } else {
            state.error_count += 1;
            if state.status != AgentStatus::Paused {
                state.status = AgentStatus::Error;
            }
        }
    }
}

/// Bus mailbox for an agent; holds it weakly so the bus does not keep it alive
struct Mailbox {
    agent: Weak<Agent>,
    agent_id: String,
}

#[async_trait]
impl MessageHandler for Mailbox {
    async fn handle_message(&self, message: Message) -> agent_comms::Result<()> {
        match self.agent.upgrade() {
            Some(agent) => agent.on_message(message).await,
            None => Err(CommsError::AgentNotFound(self.agent_id.clone())),
        }
    }
}

/// Builder for creating agents
pub struct AgentBuilder {
    id: String,
    config: AgentConfig,
    handler: Option<Arc<dyn TaskHandler>>,
    bus: Option<MessageBus>,
    registry: Option<AgentRegistry>,
    publish_state: bool,
}

impl AgentBuilder {
    pub fn new(id: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            id: id.into(),
            config,
            handler: None,
            bus: None,
            registry: None,
            publish_state: false,
        }
    }

    /// Set the task handler
    pub fn handler<H: TaskHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set a shared task handler
    pub fn handler_arc(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach to a bus; the agent gets a mailbox under its id
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// List the agent in a registry under its type and capabilities
    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Emit `agent_state_changed` after each submission and status change
    pub fn publish_state(mut self, enabled: bool) -> Self {
        self.publish_state = enabled;
        self
    }

    /// Validate, run the handler's initialization hook, then register
    pub async fn build(self) -> Result<Arc<Agent>> {
        self.config.validate()?;
        let handler = self
            .handler
            .ok_or_else(|| RuntimeError::config("Task handler is required"))?;

        let mut context = AgentContext::new(&self.id, &self.config.agent_type)
            .with_capabilities(self.config.capabilities.clone());
        if let Some(bus) = &self.bus {
            context = context.with_bus(bus.clone());
        }

        handler.on_initialize(&context).await?;

        let agent = Arc::new(Agent {
            id: self.id.clone(),
            state: Mutex::new(AgentState::new(&self.id)),
            config: self.config,
            handler,
            context,
            publish_state: self.publish_state,
        });

        if let Some(bus) = &self.bus {
            bus.register(
                &agent.id,
                Arc::new(Mailbox {
                    agent: Arc::downgrade(&agent),
                    agent_id: agent.id.clone(),
                }),
            );
        }
        if let Some(registry) = &self.registry {
            registry.register(AgentEntry::new(
                &agent.id,
                &agent.config.agent_type,
                agent.config.capabilities.iter().cloned(),
            ));
        }

        tracing::info!(
            agent_id = %agent.id,
            agent_type = %agent.config.agent_type,
            max_concurrent_tasks = agent.config.max_concurrent_tasks,
            "Agent initialized"
        );
        Ok(agent)
    }
}
