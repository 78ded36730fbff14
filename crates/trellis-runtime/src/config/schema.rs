//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use trellis_core::DEDUP_WINDOW;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrellisConfig {
    /// Turn processing limits.
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Turn processing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Age in milliseconds after which a conversation lock is stale.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Lock acquisition attempts before the turn is rejected.
    #[serde(default = "default_lock_attempts")]
    pub lock_attempts: u32,

    /// Fixed delay between lock acquisition attempts in milliseconds.
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,

    /// Per-sender event timestamps remembered for deduplication.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_attempts: default_lock_attempts(),
            lock_backoff_ms: default_lock_backoff_ms(),
            dedup_window: default_dedup_window(),
        }
    }
}

fn default_lock_timeout_ms() -> u64 {
    6000
}

fn default_lock_attempts() -> u32 {
    4
}

fn default_lock_backoff_ms() -> u64 {
    400
}

fn default_dedup_window() -> usize {
    DEDUP_WINDOW
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file path, used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `trellis_router = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            filters: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Single-line compact output.
    #[default]
    Compact,
    /// Default `tracing` formatting.
    Full,
    /// Multi-line human-oriented output.
    Pretty,
    /// Newline-delimited JSON (requires the `json-log` feature).
    #[cfg(feature = "json-log")]
    Json,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// A log file (`file_path` must be set).
    File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = TrellisConfig::default();
        assert_eq!(config.processor.lock_attempts, 4);
        assert_eq!(config.processor.dedup_window, DEDUP_WINDOW);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: TrellisConfig =
            serde_json::from_str(r#"{ "processor": { "lock_attempts": 2 } }"#).unwrap();
        assert_eq!(config.processor.lock_attempts, 2);
        assert_eq!(config.processor.lock_backoff_ms, 400);
    }
}
