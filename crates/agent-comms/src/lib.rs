//! Agent Communication Layer
//!
//! In-process delivery of point-to-point messages and broadcast events.
//!
//! # Example
//!
//! ```no_run
//! use agent_comms::{Event, MessageBus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MessageBus::new();
//!
//!     bus.subscribe("review_completed", |event| {
//!         println!("{} finished {}", event.source, event.data);
//!         Ok(())
//!     });
//!     bus.emit(Event::new("review_completed", "reviewer-1", serde_json::json!({"pr": 42})));
//!
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod message;
pub mod registry;

// Re-exports
pub use bus::{EmitReport, EventHandler, MessageBus, MessageHandler, SubscriptionId};
pub use error::{CommsError, Result};
pub use event::Event;
pub use message::{Message, STATUS_REQUEST, STATUS_RESPONSE};
pub use registry::{AgentEntry, AgentRegistry};
