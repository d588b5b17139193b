use crate::error::{Result, WatchdogError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the structured event log
pub const DEFAULT_EVENT_LOG_PATH: &str = "/tmp/watchdog_events.jsonl";

/// Longest accepted interval or timeout (one year, in seconds)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Supervision settings, fixed for the lifetime of the watchdog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Path to the executable to keep alive
    pub executable: PathBuf,

    /// Whether structured event logging is enabled
    #[serde(default)]
    pub event_log: bool,

    /// Where structured events are appended
    #[serde(default = "default_event_log_path")]
    pub event_log_path: PathBuf,

    /// Interval between statistics reports (in seconds)
    #[serde(default = "default_info_interval")]
    pub info_interval_secs: u64,

    /// Probe deadline before the child counts as unresponsive (in seconds)
    #[serde(default = "default_unresponsive_timeout")]
    pub unresponsive_timeout_secs: u64,

    /// Interval between liveness probes and statistics samples (in milliseconds)
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u64,

    /// Exit code treated as a clean shutdown of the child
    #[serde(default)]
    pub clean_exit_code: i32,
}

// Default value functions for serde
fn default_event_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_EVENT_LOG_PATH)
}

fn default_info_interval() -> u64 {
    3600
}

fn default_unresponsive_timeout() -> u64 {
    5
}

fn default_update_interval() -> u64 {
    1000
}

impl SupervisionConfig {
    /// Build a configuration for `executable` with every other setting at its default
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            event_log: false,
            event_log_path: default_event_log_path(),
            info_interval_secs: default_info_interval(),
            unresponsive_timeout_secs: default_unresponsive_timeout(),
            update_interval_ms: default_update_interval(),
            clean_exit_code: 0,
        }
    }

    /// Apply the settings present in a config file on top of this configuration
    pub fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(executable) = overlay.executable {
            self.executable = executable;
        }
        if let Some(event_log) = overlay.event_log {
            self.event_log = event_log;
        }
        if let Some(path) = overlay.event_log_path {
            self.event_log_path = path;
        }
        if let Some(secs) = overlay.info_interval_secs {
            self.info_interval_secs = secs;
        }
        if let Some(secs) = overlay.unresponsive_timeout_secs {
            self.unresponsive_timeout_secs = secs;
        }
        if let Some(ms) = overlay.update_interval_ms {
            self.update_interval_ms = ms;
        }
        if let Some(code) = overlay.clean_exit_code {
            self.clean_exit_code = code;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(WatchdogError::MissingConfigField("executable".to_string()));
        }

        if !(1..=MAX_INTERVAL_SECS).contains(&self.info_interval_secs) {
            return Err(WatchdogError::ConfigValidationError(format!(
                "info_interval_secs must be between 1 and {}",
                MAX_INTERVAL_SECS
            )));
        }

        if !(1..=MAX_INTERVAL_SECS).contains(&self.unresponsive_timeout_secs) {
            return Err(WatchdogError::ConfigValidationError(format!(
                "unresponsive_timeout_secs must be between 1 and {}",
                MAX_INTERVAL_SECS
            )));
        }

        if !(10..=MAX_INTERVAL_SECS * 1000).contains(&self.update_interval_ms) {
            return Err(WatchdogError::ConfigValidationError(format!(
                "update_interval_ms must be between 10 and {}",
                MAX_INTERVAL_SECS * 1000
            )));
        }

        if self.event_log && self.event_log_path.as_os_str().is_empty() {
            return Err(WatchdogError::MissingConfigField(
                "event_log_path".to_string(),
            ));
        }

        Ok(())
    }

    /// Get info-report interval as Duration
    pub fn info_interval(&self) -> Duration {
        Duration::from_secs(self.info_interval_secs)
    }

    /// Get unresponsiveness timeout as Duration
    pub fn unresponsive_timeout(&self) -> Duration {
        Duration::from_secs(self.unresponsive_timeout_secs)
    }

    /// Get update-tick interval as Duration
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Partial configuration read from a config file; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub executable: Option<PathBuf>,
    pub event_log: Option<bool>,
    pub event_log_path: Option<PathBuf>,
    pub info_interval_secs: Option<u64>,
    pub unresponsive_timeout_secs: Option<u64>,
    pub update_interval_ms: Option<u64>,
    pub clean_exit_code: Option<i32>,
}

impl ConfigOverlay {
    /// Load an overlay from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WatchdogError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match extension {
            "toml" => Self::parse_toml(&contents),
            "json" => Self::parse_json(&contents),
            _ => Err(WatchdogError::InvalidConfig(format!(
                "Unsupported file format: {}. Use .toml or .json",
                extension
            ))),
        }
    }

    fn parse_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| WatchdogError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| WatchdogError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }
}
