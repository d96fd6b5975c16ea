mod cli;

use clap::Parser;
use cli::Cli;
use mqd_probe::bootstrap;
use mqd_probe::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration load failed, exiting");
            std::process::exit(1);
        }
    };

    if let Err(e) = bootstrap::run(config).await {
        tracing::error!(error = %e, "probe exited with a fatal error");
        std::process::exit(1);
    }

    Ok(())
}

/// `LOGGING_LEVEL` maps onto `tracing`'s `EnvFilter`; `RUST_LOG` takes
/// precedence when set.
fn init_tracing() {
    let level = std::env::var("LOGGING_LEVEL").unwrap_or_else(|_| "WARNING".to_string());
    let directive = match level.to_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "FATAL" | "PANIC" => "error",
        "DISABLED" => "off",
        _ => "warn",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
