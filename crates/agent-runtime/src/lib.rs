//! Agent Runtime
//!
//! The execution kernel every agent runs on: per-attempt timeouts, bounded
//! retries with exponential backoff, a concurrency limit and an observable
//! state.
//!
//! # Example
//!
//! ```no_run
//! use agent_comms::MessageBus;
//! use agent_core::AgentConfig;
//! use agent_runtime::{Agent, Task, TaskError, TaskRouter};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = TaskRouter::new().task("review", |task, ctx| async move {
//!         ctx.emit("review_completed", json!({"pr": task.payload["pr"]}), None);
//!         Ok::<_, TaskError>(json!({"approved": true}))
//!     });
//!
//!     let agent = Agent::builder("reviewer-1", AgentConfig::new("reviewer", "Reviewer"))
//!         .handler(router)
//!         .bus(MessageBus::new())
//!         .build()
//!         .await?;
//!
//!     let result = agent.submit(Task::new("review", json!({"pr": 42}))).await;
//!     println!("success: {}", result.success);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod context;
pub mod error;
pub mod handler;
pub mod state;
pub mod task;

// Re-exports
pub use agent::{Admission, Agent, AgentBuilder, RefusalReason, AGENT_STATE_CHANGED};
pub use context::AgentContext;
pub use error::{Result, RuntimeError, TaskError};
pub use handler::{TaskHandler, TaskRouter};
pub use state::{AgentState, AgentStatus};
pub use task::{Priority, Task, TaskResult};
