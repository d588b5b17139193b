use thiserror::Error;

/// Main error type for the watchdog
#[derive(Debug, Error)]
pub enum WatchdogError {
    // Supervision errors
    #[error("Failed to launch process: {0}")]
    LaunchError(String),

    #[error("Process {0} did not respond within the probe timeout")]
    ProbeTimeout(u32),

    #[error("Failed to terminate process {0}: {1}")]
    KillFailure(u32, String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Event log errors
    #[error("Event log error: {0}")]
    EventLogError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for watchdog operations
pub type Result<T> = std::result::Result<T, WatchdogError>;
