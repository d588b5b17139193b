// Console echo for supervision events

use crate::logs::Severity;
use chrono::Local;
use colored::*;

/// Echo a supervision event to the console
///
/// Informational events go to stdout, errors to stderr.
pub fn print_event(message: &str, severity: Severity) {
    let line = format_event(&timestamp(), message, severity);
    match severity {
        Severity::Info => println!("{}", line),
        Severity::Error => eprintln!("{}", line),
    }
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_event(timestamp: &str, message: &str, severity: Severity) -> String {
    let stamp = format!("[{}]", timestamp).dimmed();
    match severity {
        Severity::Info => format!("{} {}", stamp, message),
        Severity::Error => format!("{} {}", stamp, message.red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_event_keeps_message() {
        colored::control::set_override(false);

        assert_eq!(
            format_event("2024-01-01 10:00:00", "kiosk started", Severity::Info),
            "[2024-01-01 10:00:00] kiosk started"
        );
        assert_eq!(
            format_event("2024-01-01 10:00:00", "kiosk crashed", Severity::Error),
            "[2024-01-01 10:00:00] kiosk crashed"
        );
    }

    #[test]
    fn test_timestamp_shape() {
        let stamp = timestamp();
        assert_eq!(stamp.len(), 19);
        assert_eq!(&stamp[4..5], "-");
        assert_eq!(&stamp[10..11], " ");
    }
}
