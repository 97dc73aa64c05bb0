//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Build the server from validated config
//! - Bind plain TCP or TLS and serve until shutdown
//!
//! Any startup error is fatal.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{ConfigError, ShieldConfig};
use crate::http::ShieldServer;
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid {field} address '{value}'")]
    Address { field: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the server described by `config` until `shutdown` fires.
pub async fn run(config: ShieldConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr = parse_addr("metrics", &config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    let server = ShieldServer::new(config)?;

    match tls {
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server.serve(listener, shutdown.signalled()).await?;
        }
        Some(tls) => {
            let addr = parse_addr("listener", &bind_address)?;
            let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;

            let handle = axum_server::Handle::new();
            let drain = handle.clone();
            let signalled = shutdown.signalled();
            tokio::spawn(async move {
                signalled.await;
                drain.graceful_shutdown(Some(grace));
            });

            tracing::info!(address = %addr, "HTTPS server starting");
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(server.router().into_make_service_with_connect_info::<SocketAddr>())
                .await?;
            tracing::info!("HTTPS server stopped");
        }
    }

    Ok(())
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}
