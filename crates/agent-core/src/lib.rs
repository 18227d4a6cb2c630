//! Agent Core
//!
//! Foundations shared by the kernel and the coordination crates: the base
//! error type, layered configuration and logging setup.

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{
    load_config, load_config_or_default, AgentConfig, EscalationSettings, LoggingConfig,
    MonitorSettings, PatternSettings, RuntimeConfig,
};
pub use error::{panic_message, AgentError, Result};
pub use logging::init_logging;
