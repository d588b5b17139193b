use crate::error::{Result, WatchdogError};
use crate::logs::Severity;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default maximum event log size before rotation (10MB)
const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// One line of the structured event log
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    timestamp: String,
    severity: Severity,
    message: &'a str,
}

/// Appends supervision events as JSON lines, rotating the file by size
pub struct EventLogWriter {
    /// Path to the active event log file
    path: PathBuf,
    /// Handle to the active event log file
    file: File,
    /// Maximum size in bytes before rotation
    max_size: u64,
    /// Current size of the active file
    size: u64,
}

impl EventLogWriter {
    /// Open (or create) the event log at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_max_size(path, DEFAULT_MAX_LOG_SIZE)
    }

    /// Open the event log with a custom rotation threshold
    pub fn with_max_size(path: &Path, max_size: u64) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                WatchdogError::EventLogError(format!("Failed to create log directory: {}", e))
            })?;
        }

        let file = Self::open_append(path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            max_size,
            size,
        })
    }

    /// Append one event
    pub fn write_event(&mut self, message: &str, severity: Severity) -> Result<()> {
        if self.size >= self.max_size {
            self.rotate()?;
        }

        let line = Self::format_record(&Local::now(), message, severity)?;

        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .map_err(|e| WatchdogError::EventLogError(format!("Failed to write event: {}", e)))?;

        self.size += line.len() as u64;

        Ok(())
    }

    fn format_record(
        timestamp: &DateTime<Local>,
        message: &str,
        severity: Severity,
    ) -> Result<Vec<u8>> {
        let record = EventRecord {
            timestamp: timestamp.to_rfc3339(),
            severity,
            message,
        };

        let mut line = serde_json::to_vec(&record).map_err(|e| {
            WatchdogError::EventLogError(format!("Failed to serialize event: {}", e))
        })?;
        line.push(b'\n');

        Ok(line)
    }

    /// Move the full log aside with a timestamp suffix and start a fresh file
    fn rotate(&mut self) -> Result<()> {
        let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let file_stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| WatchdogError::EventLogError("Invalid log file name".to_string()))?;
        let extension = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("log");

        let rotated_path = self
            .path
            .with_file_name(format!("{}-{}.{}", file_stem, timestamp, extension));

        std::fs::rename(&self.path, &rotated_path).map_err(|e| {
            WatchdogError::EventLogError(format!("Failed to rotate event log: {}", e))
        })?;

        self.file = Self::open_append(&self.path)?;
        self.size = 0;

        Ok(())
    }

    fn open_append(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                WatchdogError::EventLogError(format!(
                    "Failed to open event log {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    /// Get the path to the active event log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current size of the active event log
    pub fn size(&self) -> u64 {
        self.size
    }
}
