use crate::process::types::{ChildProcess, RunningStatistics};
use std::time::Duration;
use sysinfo::System;

/// Formats status lines about the supervised process
///
/// Pure formatting: callers pick the severity and the sink.
#[derive(Debug, Clone)]
pub struct Reporter {
    host: String,
}

impl Reporter {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Reporter for the machine the watchdog runs on
    pub fn for_local_host() -> Self {
        Self::new(System::host_name().unwrap_or_else(|| "unknown".to_string()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Periodic statistics line for a running child
    pub fn snapshot(&self, child: &ChildProcess, stats: &RunningStatistics) -> String {
        format!(
            "Process: {} | PID: {} | Processor time: {} | Machine: {} | Peak memory: {}",
            child.name,
            child.pid,
            format_cpu_time(stats.cpu_time),
            self.host,
            format_memory(stats.peak_memory)
        )
    }

    /// Final line for a child that has terminated
    pub fn exit_summary(&self, child: &ChildProcess, stats: &RunningStatistics) -> String {
        let exit_code = child
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Process {} (PID: {}) exited with code {} after {} | Processor time: {} | Machine: {} | Peak memory: {}",
            child.name,
            child.pid,
            exit_code,
            format_duration(&child.uptime()),
            format_cpu_time(stats.cpu_time),
            self.host,
            format_memory(stats.peak_memory)
        )
    }

    pub fn launched(&self, child: &ChildProcess) -> String {
        format!(
            "Started {} (PID: {}) on {}",
            child.name, child.pid, self.host
        )
    }
}

/// Format a duration in human-readable format
pub fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Processor time keeps sub-second precision below one minute
pub fn format_cpu_time(duration: Duration) -> String {
    if duration.as_secs() < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format_duration(&duration)
    }
}

/// Format memory usage in human-readable format
pub fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}
