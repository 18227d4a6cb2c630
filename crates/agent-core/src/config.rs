//! Configuration management for the agent kernel
//!
//! Configuration is assembled from, in increasing priority:
//! - Built-in defaults
//! - A configuration file (TOML, JSON or YAML, chosen by extension)
//! - Environment variables prefixed with `AGENT__` (`__` separates sections,
//!   e.g. `AGENT__MONITOR__OVERLOAD_THRESHOLD=8`)
//!
//! Every threshold used by the coordination layer lives here so deployments can
//! tune them without code changes.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a process hosting agents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,

    /// Default execution policy for agents built from this configuration
    pub agent: AgentConfig,

    pub escalation: EscalationSettings,

    pub patterns: PatternSettings,

    pub monitor: MonitorSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Static capability and policy descriptor of one agent
///
/// Fixed when the agent is built; the kernel never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Kind of agent (e.g. "reviewer", "dashboard")
    pub agent_type: String,

    /// Human-readable name
    pub name: String,

    /// Upper bound on tasks tracked concurrently
    pub max_concurrent_tasks: usize,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Total attempts per task, including the first
    pub retry_attempts: u32,

    /// Wait after the first failed attempt; doubles on each further failure
    pub backoff_base_ms: u64,

    /// Ceiling for a single backoff wait
    pub backoff_max_ms: u64,

    pub capabilities: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_type: "generic".to_string(),
            name: "agent".to_string(),
            max_concurrent_tasks: 5,
            timeout_ms: 30_000,
            retry_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 300_000,
            capabilities: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn new(agent_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Reject policies the kernel cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(AgentError::validation(
                "agent.max_concurrent_tasks",
                "must be at least 1",
            ));
        }
        if self.retry_attempts == 0 {
            return Err(AgentError::validation(
                "agent.retry_attempts",
                "must be at least 1",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(AgentError::validation("agent.timeout_ms", "must be positive"));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(AgentError::validation(
                "agent.backoff_max_ms",
                "must not be smaller than backoff_base_ms",
            ));
        }
        Ok(())
    }
}

/// SLA tracking and escalation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    /// How often the compliance sweep runs
    pub check_interval_secs: u64,

    /// Items closer than this to their deadline are reported at risk
    pub at_risk_window_secs: u64,

    /// Recipient of level 2 notifications
    pub lead_id: String,

    /// Recipient of level 3 notifications
    pub management_id: String,

    /// Capability a registered agent needs to be added as backup worker
    pub backup_capability: String,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            at_risk_window_secs: 3_600,
            lead_id: "review-lead".to_string(),
            management_id: "management".to_string(),
            backup_capability: "review".to_string(),
        }
    }
}

impl EscalationSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn at_risk_window(&self) -> Duration {
        Duration::from_secs(self.at_risk_window_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(AgentError::validation(
                "escalation.check_interval_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Effectiveness scoring and evolution policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    /// Weight kept by the previous score on each update (0.8 keeps 80%)
    pub smoothing: f64,

    /// Recent outcomes required before evolution is considered
    pub min_samples: usize,

    /// Number of recent outcomes retained per pattern
    pub recent_window: usize,

    /// Evolve when the recent success rate falls below this
    pub success_threshold: f64,

    /// Evolve when mean recent effectiveness falls below this
    pub score_threshold: f64,

    /// Share of the ranking given to context relevance
    pub relevance_weight: f64,

    /// Relative nudge applied to numeric parameters of an evolved pattern
    pub parameter_adjustment: f64,

    pub evolution_interval_secs: u64,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            min_samples: 10,
            recent_window: 20,
            success_threshold: 0.6,
            score_threshold: 0.5,
            relevance_weight: 0.3,
            parameter_adjustment: 0.1,
            evolution_interval_secs: 3_600,
        }
    }
}

impl PatternSettings {
    pub fn evolution_interval(&self) -> Duration {
        Duration::from_secs(self.evolution_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.evolution_interval_secs == 0 {
            return Err(AgentError::validation(
                "patterns.evolution_interval_secs",
                "must be greater than 0",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(AgentError::validation(
                "patterns.smoothing",
                "must be within [0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_weight) {
            return Err(AgentError::validation(
                "patterns.relevance_weight",
                "must be within [0, 1]",
            ));
        }
        if self.recent_window < self.min_samples {
            return Err(AgentError::validation(
                "patterns.recent_window",
                "must hold at least min_samples outcomes",
            ));
        }
        Ok(())
    }
}

/// Bottleneck detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_interval_secs: u64,

    /// A running workflow times out after `timeout_factor` x its expected duration
    pub timeout_factor: f64,

    /// Agents tracking more tasks than this are overloaded
    pub overload_threshold: usize,

    /// Agents with more failed tasks than this are flagged
    pub error_threshold: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            timeout_factor: 1.5,
            overload_threshold: 5,
            error_threshold: 3,
        }
    }
}

impl MonitorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(AgentError::validation(
                "monitor.tick_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.timeout_factor < 1.0 {
            return Err(AgentError::validation(
                "monitor.timeout_factor",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

impl RuntimeConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.escalation.validate()?;
        self.patterns.validate()?;
        self.monitor.validate()?;
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from a file, layered with `AGENT__*` environment variables
///
/// # Example
///
/// ```no_run
/// use agent_core::config::load_config;
///
/// let config = load_config("agents.toml").unwrap();
/// println!("Retry attempts: {}", config.agent.retry_attempts);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(AgentError::config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("AGENT").separator("__"))
        .build()?;

    let config: RuntimeConfig = settings.try_deserialize()?;
    config.validate()?;

    tracing::info!(path = %path.display(), "Configuration loaded");

    Ok(config)
}

/// Load configuration, falling back to defaults when the file is missing or invalid
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> RuntimeConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.agent.max_concurrent_tasks, 5);
        assert_eq!(config.agent.retry_attempts, 3);
        assert_eq!(config.agent.backoff_base(), Duration::from_secs(2));
        assert_eq!(config.patterns.smoothing, 0.8);
        assert_eq!(config.patterns.min_samples, 10);
        assert_eq!(config.monitor.timeout_factor, 1.5);
        assert_eq!(config.monitor.overload_threshold, 5);
        assert_eq!(config.monitor.error_threshold, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "agent": { "name": "reviewer-1", "retry_attempts": 2 },
            "monitor": { "overload_threshold": 8 }
        }"#;

        let config: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent.name, "reviewer-1");
        assert_eq!(config.agent.retry_attempts, 2);
        assert_eq!(config.agent.timeout_ms, 30_000);
        assert_eq!(config.monitor.overload_threshold, 8);
        assert_eq!(config.monitor.error_threshold, 3);
        assert_eq!(config.escalation.lead_id, "review-lead");
    }

    #[test]
    fn test_agent_validation() {
        let config = AgentConfig::default().with_retry_attempts(0);
        assert!(matches!(
            config.validate(),
            Err(AgentError::Validation { ref field, .. }) if field == "agent.retry_attempts"
        ));

        let config = AgentConfig::default().with_max_concurrent_tasks(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pattern_validation() {
        let settings = PatternSettings {
            smoothing: 1.0,
            ..PatternSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = PatternSettings {
            recent_window: 5,
            ..PatternSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let mut config = RuntimeConfig::default();
        config.escalation.check_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(AgentError::Validation { ref field, .. }) if field == "escalation.check_interval_secs"
        ));

        let mut config = RuntimeConfig::default();
        config.patterns.evolution_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(AgentError::Validation { ref field, .. }) if field == "patterns.evolution_interval_secs"
        ));

        let mut config = RuntimeConfig::default();
        config.monitor.tick_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(AgentError::Validation { ref field, .. }) if field == "monitor.tick_interval_secs"
        ));

        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_capabilities() {
        let config = AgentConfig::new("reviewer", "r1").with_capabilities(["review", "lint"]);
        assert!(config.has_capability("review"));
        assert!(!config.has_capability("deploy"));
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[agent]
agent_type = "reviewer"
name = "reviewer-1"
timeout_ms = 1000

[escalation]
lead_id = "alice"
"#
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.agent.agent_type, "reviewer");
        assert_eq!(config.agent.timeout(), Duration::from_secs(1));
        assert_eq!(config.escalation.lead_id, "alice");
        assert_eq!(config.escalation.management_id, "management");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[monitor]\ntimeout_factor = 0.5\n").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(AgentError::Validation { .. })));
    }

    #[test]
    fn test_load_nonexistent_file() {
        assert!(load_config("nonexistent.toml").is_err());
        let config = load_config_or_default("nonexistent.toml");
        assert_eq!(config.agent.name, "agent");
    }
}
