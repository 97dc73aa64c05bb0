use std::path::PathBuf;

use clap::Parser;

use request_shield::config::load_config;
use request_shield::lifecycle::{self, signals, Shutdown};
use request_shield::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "request-shield")]
#[command(about = "Rate limiting, CORS and request signing in front of an HTTP API", long_about = None)]
struct Cli {
    /// TOML config file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-shield starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        window_secs = config.rate_limit.window_secs,
        max_requests = config.rate_limit.max_requests,
        chat_max_requests = config.rate_limit.chat_max_requests,
        allowed_origins = config.cors.allowed_origins.len(),
        signing = !config.signature.secret.is_empty(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::forward_signals(shutdown.clone()));

    lifecycle::run(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
