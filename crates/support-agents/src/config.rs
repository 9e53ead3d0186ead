use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use coordination::PolicyConfig;
use serde::{Deserialize, Serialize};

/// Top-level support orchestrator configuration.
///
/// Built from defaults, then an optional TOML file, then `SUPPORT_*`
/// environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    /// Routing policy constants
    pub policy: PolicyConfig,
    /// History entries fetched per turn for enrichment
    pub history_limit: usize,
    /// Expected latency of one handler run, in milliseconds
    pub handler_latency_ms: u64,
    /// Explicit turn deadline; derived from the latency when unset
    pub turn_timeout_ms: Option<u64>,
    /// Message log length that triggers compaction
    pub max_message_log: usize,
    /// Directory for the durable stores (in-memory when unset)
    pub state_dir: Option<PathBuf>,
    /// JSONL file receiving turn events
    pub telemetry_path: Option<PathBuf>,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            history_limit: 5,
            handler_latency_ms: 5_000,
            turn_timeout_ms: None,
            max_message_log: 50,
            state_dir: None,
            telemetry_path: None,
        }
    }
}

/// Multiple of the per-dispatch latency allowed for a whole turn
const TIMEOUT_MULTIPLIER: u64 = 2;

impl SupportConfig {
    /// Load the TOML file at `path`
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        let config: SupportConfig =
            toml::from_str(&content).context("Failed to parse support config TOML")?;
        Ok(config)
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `SUPPORT_*` overrides read through `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .trim()
                .parse::<T>()
                .context(format!("Invalid value for {key}: {value:?}"))
        }

        if let Some(v) = lookup("SUPPORT_CONFIDENCE_THRESHOLD") {
            self.policy.confidence_threshold = parse("SUPPORT_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_MAX_HANDLER_CALLS") {
            self.policy.max_handler_calls_per_turn = parse("SUPPORT_MAX_HANDLER_CALLS", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_MAX_HANDLER_FAILURES") {
            self.policy.max_handler_failures = parse("SUPPORT_MAX_HANDLER_FAILURES", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_ESCALATE_CRITICAL") {
            self.policy.escalate_critical_urgency = parse("SUPPORT_ESCALATE_CRITICAL", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_HISTORY_LIMIT") {
            self.history_limit = parse("SUPPORT_HISTORY_LIMIT", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_HANDLER_LATENCY_MS") {
            self.handler_latency_ms = parse("SUPPORT_HANDLER_LATENCY_MS", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_TURN_TIMEOUT_MS") {
            self.turn_timeout_ms = Some(parse("SUPPORT_TURN_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("SUPPORT_MAX_MESSAGE_LOG") {
            self.max_message_log = parse("SUPPORT_MAX_MESSAGE_LOG", &v)?;
        }
        if let Some(v) = lookup("SUPPORT_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SUPPORT_TELEMETRY_PATH") {
            self.telemetry_path = Some(PathBuf::from(v));
        }
        self.policy = self.policy.normalized();
        Ok(self)
    }

    /// Deadline for one turn
    pub fn turn_timeout(&self) -> Duration {
        let ms = self.turn_timeout_ms.unwrap_or_else(|| {
            self.handler_latency_ms
                .saturating_mul(self.policy.max_total_dispatches() as u64)
                .saturating_mul(TIMEOUT_MULTIPLIER)
        });
        Duration::from_millis(ms.max(1))
    }
}
