//! Pluggable task and message behavior

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use agent_comms::{CommsError, Message};

use crate::{AgentContext, Result, Task, TaskError};

/// Behavior plugged into an agent
///
/// Only `process_task` is required. The kernel owns retries, timeouts and
/// bookkeeping; a handler just does one attempt of the work.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Perform one attempt of a task
    async fn process_task(&self, task: &Task, ctx: &AgentContext) -> std::result::Result<Value, TaskError>;

    /// Called once while the agent is being built
    async fn on_initialize(&self, _ctx: &AgentContext) -> Result<()> {
        Ok(())
    }

    /// Handle a message addressed to the agent
    ///
    /// The default drops the message.
    async fn handle_message(&self, message: &Message, ctx: &AgentContext) -> agent_comms::Result<()> {
        tracing::debug!(
            agent_id = %ctx.agent_id,
            message_type = %message.message_type,
            from = %message.from,
            "Dropping unhandled message"
        );
        Ok(())
    }
}

type TaskRoute = Arc<dyn Fn(Task, AgentContext) -> BoxFuture<'static, std::result::Result<Value, TaskError>> + Send + Sync>;
type MessageRoute = Arc<dyn Fn(Message, AgentContext) -> BoxFuture<'static, agent_comms::Result<()>> + Send + Sync>;

/// Handler that dispatches on task type and message type
///
/// ```
/// use agent_runtime::{TaskError, TaskRouter};
/// use serde_json::json;
///
/// let router = TaskRouter::new()
///     .task("review", |task, _ctx| async move {
///         Ok::<_, TaskError>(json!({"reviewed": task.payload["pr"]}))
///     })
///     .task("lint", |_task, _ctx| async move {
///         Err::<serde_json::Value, _>(TaskError::execution("linter missing"))
///     });
/// assert!(router.handles_task("review"));
/// ```
#[derive(Default, Clone)]
pub struct TaskRouter {
    tasks: HashMap<String, TaskRoute>,
    messages: HashMap<String, MessageRoute>,
    strict_messages: bool,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route tasks of one type to an async closure
    pub fn task<F, Fut>(mut self, task_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(Task, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, TaskError>> + Send + 'static,
    {
        let route: TaskRoute = Arc::new(move |task: Task, ctx: AgentContext| f(task, ctx).boxed());
        self.tasks.insert(task_type.into(), route);
        self
    }

    /// Route messages of one type to an async closure
    pub fn message<F, Fut>(mut self, message_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(Message, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = agent_comms::Result<()>> + Send + 'static,
    {
        let route: MessageRoute =
            Arc::new(move |message: Message, ctx: AgentContext| f(message, ctx).boxed());
        self.messages.insert(message_type.into(), route);
        self
    }

    /// Reject unrouted messages with `UnknownMessageType` instead of dropping them
    pub fn strict_messages(mut self, strict: bool) -> Self {
        self.strict_messages = strict;
        self
    }

    pub fn handles_task(&self, task_type: &str) -> bool {
        self.tasks.contains_key(task_type)
    }

    pub fn handles_message(&self, message_type: &str) -> bool {
        self.messages.contains_key(message_type)
    }
}

#[async_trait]
impl TaskHandler for TaskRouter {
    async fn process_task(&self, task: &Task, ctx: &AgentContext) -> std::result::Result<Value, TaskError> {
        let route = self
            .tasks
            .get(&task.task_type)
            .ok_or_else(|| TaskError::UnknownTaskType(task.task_type.clone()))?;
        route(task.clone(), ctx.clone()).await
    }

    async fn handle_message(&self, message: &Message, ctx: &AgentContext) -> agent_comms::Result<()> {
        match self.messages.get(&message.message_type) {
            Some(route) => route(message.clone(), ctx.clone()).await,
            None if self.strict_messages => {
                Err(CommsError::UnknownMessageType(message.message_type.clone()))
            }
            None => {
                tracing::debug!(
                    agent_id = %ctx.agent_id,
                    message_type = %message.message_type,
                    "No route for message, dropping"
                );
                Ok(())
            }
        }
    }
}
