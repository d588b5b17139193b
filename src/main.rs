use tracing_subscriber::EnvFilter;
use watchdog::cli::{output, Cli};

#[tokio::main]
async fn main() {
    // Diagnostics only; supervision events have their own sinks
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = Cli::run().await {
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
}
