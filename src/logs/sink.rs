use crate::cli::output;
use crate::config::SupervisionConfig;
use crate::error::Result;
use crate::logs::EventLogWriter;
use serde::Serialize;

/// Severity of a supervision event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Destination for supervision events
///
/// The supervisor decides the message and its severity; sinks only record it.
pub trait LogSink: Send {
    fn log(&mut self, message: &str, severity: Severity);
}

/// Echoes events to the console
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn log(&mut self, message: &str, severity: Severity) {
        output::print_event(message, severity);
    }
}

/// Console echo plus the optional structured event log
pub struct EventLogger {
    console: ConsoleSink,
    event_log: Option<EventLogWriter>,
}

impl EventLogger {
    /// Build the sink for a configuration, opening the event log when enabled
    pub fn from_config(config: &SupervisionConfig) -> Result<Self> {
        let event_log = if config.event_log {
            Some(EventLogWriter::open(&config.event_log_path)?)
        } else {
            None
        };

        Ok(Self {
            console: ConsoleSink,
            event_log,
        })
    }

    /// Console-only sink
    pub fn console_only() -> Self {
        Self {
            console: ConsoleSink,
            event_log: None,
        }
    }

    pub fn has_event_log(&self) -> bool {
        self.event_log.is_some()
    }
}

impl LogSink for EventLogger {
    fn log(&mut self, message: &str, severity: Severity) {
        self.console.log(message, severity);

        if let Some(ref mut writer) = self.event_log {
            if let Err(e) = writer.write_event(message, severity) {
                tracing::warn!("Failed to record event: {}", e);
            }
        }
    }
}
