// CLI module - Command-line entry point for the watchdog

pub mod output;

use crate::config::{ConfigOverlay, SupervisionConfig, MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::logs::EventLogger;
use crate::process::{OsLauncher, ProcessMonitor, StatusProbe, Supervisor};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Watchdog - keeps one executable running, restarting it when it hangs or exits
#[derive(Parser, Debug)]
#[command(name = "watchdog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Executable to supervise (relative paths resolve against the watchdog's directory)
    executable: PathBuf,

    /// Enable structured event logging
    #[arg(short, long)]
    event_log: bool,

    /// Seconds between statistics reports [default: 3600]
    #[arg(short, long, value_name = "SECONDS", allow_hyphen_values = true)]
    info_interval: Option<String>,

    /// Upper bound in seconds for each liveness check [default: 5]
    ///
    /// The built-in check reads the process state from the OS: a stopped,
    /// traced or zombie child counts as hung, while a busy or blocked one
    /// does not. It answers well within this bound.
    #[arg(short = 't', long = "timeout", value_name = "SECONDS", allow_hyphen_values = true)]
    timeout: Option<String>,

    /// TOML or JSON file with additional supervision settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Prints usage at most once, however many flags are malformed
#[derive(Debug, Default)]
pub struct UsageNotice {
    times_shown: usize,
}

impl UsageNotice {
    pub fn new() -> Self {
        Self::default()
    }

    fn report_malformed(&mut self, flag: &str, value: &str, fallback: u64) {
        output::print_warning(&format!(
            "Ignoring invalid value '{}' for --{}, using {}",
            value, flag, fallback
        ));

        if self.times_shown == 0 {
            println!("{}", Cli::command().render_usage());
        }
        self.times_shown += 1;
    }

    /// Whether usage has been printed during this run
    pub fn was_shown(&self) -> bool {
        self.times_shown > 0
    }
}

impl Cli {
    /// Run the CLI application
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        let mut usage = UsageNotice::new();
        let config = cli.into_config(&mut usage)?;
        execute(config).await
    }

    /// Build the supervision settings: defaults, then the config file, then flags
    pub fn into_config(self, usage: &mut UsageNotice) -> Result<SupervisionConfig> {
        let mut config = SupervisionConfig::new(self.executable.clone());

        if let Some(ref path) = self.config {
            config.apply_overlay(ConfigOverlay::from_file(path)?);
            config.executable = self.executable.clone();
        }

        if self.event_log {
            config.event_log = true;
        }

        if let Some(ref raw) = self.info_interval {
            match parse_seconds(raw) {
                Some(secs) => config.info_interval_secs = secs,
                None => usage.report_malformed("info-interval", raw, config.info_interval_secs),
            }
        }

        if let Some(ref raw) = self.timeout {
            match parse_seconds(raw) {
                Some(secs) => config.unresponsive_timeout_secs = secs,
                None => usage.report_malformed("timeout", raw, config.unresponsive_timeout_secs),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a positive number of seconds no larger than [`MAX_INTERVAL_SECS`]
fn parse_seconds(raw: &str) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| (1..=MAX_INTERVAL_SECS).contains(secs))
}

/// Supervise the configured executable until asked to stop
async fn execute(config: SupervisionConfig) -> Result<()> {
    let sink = EventLogger::from_config(&config)?;

    output::print_info(&format!(
        "Watching {} (timeout {}s, report every {}s{}). Press Enter to stop.",
        config.executable.display(),
        config.unresponsive_timeout_secs,
        config.info_interval_secs,
        if sink.has_event_log() {
            format!(", events to {}", config.event_log_path.display())
        } else {
            String::new()
        }
    ));

    let supervisor = Supervisor::new(
        config,
        Box::new(OsLauncher::new()),
        Box::new(StatusProbe::new()),
        Box::new(ProcessMonitor::new()),
        Box::new(sink),
    );

    supervisor.run(shutdown_signal()).await
}

/// Resolves on a line from the console, SIGINT, or SIGTERM
async fn shutdown_signal() {
    tokio::select! {
        _ = console_line() => {
            output::print_info("Stop requested from console");
        }
        _ = termination_signal() => {}
    }
}

async fn console_line() {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    match stdin.read_line(&mut line).await {
        Ok(read) if read > 0 => {}
        Ok(_) => {
            tracing::debug!("stdin closed, waiting for a signal to stop");
            std::future::pending::<()>().await;
        }
        Err(e) => {
            tracing::warn!("Failed to read from stdin: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to install signal handlers: {}", e);
                return std::future::pending::<()>().await;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            output::print_info("Received SIGTERM");
        }
        _ = sigint.recv() => {
            output::print_info("Received SIGINT");
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
