//! Sadaka Server
//!
//! Serves the payment API, runs the status tracker that applies gateway
//! callbacks, and runs the confirmation sweeper that polls and expires
//! payments whose callback never came.
//!
//! # Usage
//!
//! ```bash
//! # Development, simulated gateway and built-in catalog
//! sadaka-server
//!
//! # Against Daraja with a custom catalog
//! MPESA_CONSUMER_KEY=... MPESA_CONSUMER_SECRET=... MPESA_PASSKEY=... \
//! MPESA_CALLBACK_URL=https://example.org/api/v1/mpesa/callback \
//! sadaka-server --gateway mpesa --catalog catalog.json
//!
//! # Environment overrides
//! SADAKA__PAYMENTS__CONFIRMATION_TIMEOUT=3m sadaka-server
//! ```

mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sadaka_api::{create_router, ApiConfig, AppState};
use sadaka_core::{
    CatalogConfig, LoggingDispatcher, PaymentCatalog, PaymentGateway, PaymentRuntime,
};
use sadaka_mpesa::{MpesaConfig, MpesaGateway, SimulatedGateway};

use crate::config::{GatewayMode, GatewaySettings, ServerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Sadaka payment server
#[derive(Parser, Debug)]
#[command(name = "sadaka-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "SADAKA_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "SADAKA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SADAKA_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SADAKA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "SADAKA_LOG_FORMAT")]
    log_format: Option<String>,

    /// Payment gateway
    #[arg(long, env = "SADAKA_GATEWAY", value_enum)]
    gateway: Option<GatewayMode>,

    /// JSON destination catalog
    #[arg(long, env = "SADAKA_CATALOG")]
    catalog: Option<std::path::PathBuf>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut server_config = ServerConfig::load(args.config.as_deref())?;

    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }
    if let Some(mode) = args.gateway {
        server_config.gateway.mode = mode;
    }
    if let Some(path) = args.catalog {
        server_config.catalog.path = Some(path);
    }

    init_logging(&server_config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway = ?server_config.gateway.mode,
        "Starting Sadaka server"
    );

    let catalog = Arc::new(load_catalog(server_config.catalog.path.as_deref())?);
    tracing::info!(
        destinations = catalog.list_destinations().len(),
        "Payment catalog loaded"
    );

    let daraja = init_daraja(&server_config.gateway)?;
    let simulated = server_config.gateway.simulated.clone();
    let runtime = PaymentRuntime::in_memory(
        &server_config.payments,
        catalog,
        Arc::new(LoggingDispatcher),
        move |updates| match daraja {
            Some(gateway) => gateway,
            None => Arc::new(SimulatedGateway::new(simulated, updates)) as Arc<dyn PaymentGateway>,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tracker = runtime.tracker.spawn();
    let sweeper = runtime.sweeper.spawn(shutdown_rx);

    let api_config = ApiConfig {
        enable_cors: server_config.api.enable_cors,
        cors_origins: server_config.api.cors_origins.clone(),
        enable_tracing: server_config.api.enable_tracing,
    };
    let app = create_router(Arc::new(AppState::new(runtime.service)), api_config);

    let addr = server_config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last service handle; once simulated confirmations
    // drain, the tracker sees its channel close and exits.
    let _ = shutdown_tx.send(true);
    let grace = server_config.server.shutdown_timeout;
    if tokio::time::timeout(grace, sweeper).await.is_err() {
        tracing::warn!("Confirmation sweeper did not stop in time");
    }
    if tokio::time::timeout(grace, tracker).await.is_err() {
        tracing::warn!("Status tracker still had pending updates at shutdown");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
}

/// Built-in catalog, or a validated JSON file
fn load_catalog(path: Option<&Path>) -> anyhow::Result<PaymentCatalog> {
    let Some(path) = path else {
        return Ok(PaymentCatalog::builtin()?);
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let catalog = PaymentCatalog::from_config(CatalogConfig::from_json(&json)?)
        .with_context(|| format!("validating catalog {}", path.display()))?;
    Ok(catalog)
}

/// Daraja client when the M-Pesa gateway is selected
fn init_daraja(settings: &GatewaySettings) -> anyhow::Result<Option<Arc<dyn PaymentGateway>>> {
    if settings.mode != GatewayMode::Mpesa {
        return Ok(None);
    }

    let config = match settings.mpesa.clone() {
        Some(config) => config,
        None => MpesaConfig::from_env()?,
    };
    tracing::info!(daraja = ?config, "Using Daraja gateway");

    let gateway = MpesaGateway::new(config)?;
    Ok(Some(Arc::new(gateway)))
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["sadaka-server", "--port", "8080", "--gateway", "mpesa"]);
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.gateway, Some(GatewayMode::Mpesa));
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = load_catalog(None).unwrap();
        assert!(catalog.destination("Offering").is_ok());
    }

    #[test]
    fn test_missing_catalog_file() {
        let err = load_catalog(Some(Path::new("/nonexistent/catalog.json"))).unwrap_err();
        assert!(err.to_string().contains("reading catalog"));
    }

    #[test]
    fn test_simulated_mode_needs_no_credentials() {
        let settings = GatewaySettings::default();
        assert!(init_daraja(&settings).unwrap().is_none());
    }

    #[test]
    fn test_mpesa_mode_rejects_incomplete_settings() {
        let settings = GatewaySettings {
            mode: GatewayMode::Mpesa,
            mpesa: Some(MpesaConfig::default()),
            ..GatewaySettings::default()
        };
        assert!(init_daraja(&settings).is_err());
    }
}
