//! Server Configuration
//!
//! Layered from `config/default`, `config/local`, an optional explicit file
//! and `SADAKA__`-prefixed environment variables, in that order. Every
//! section has defaults, so an empty environment yields a working
//! development server on the simulated gateway.

use anyhow::Context;
use sadaka_core::PaymentConfig;
use sadaka_mpesa::{MpesaConfig, SimulatedConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Amount limits, confirmation window, retry policy
    #[serde(default)]
    pub payments: PaymentConfig,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,
}

/// Server binding settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period for background tasks after the listener stops
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

/// API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub enable_tracing: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: default_cors_origins(),
            enable_tracing: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Where the destination catalog comes from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSettings {
    /// JSON catalog file; the built-in catalog when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Which gateway payments go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Confirms every payment after a delay
    #[default]
    Simulated,
    /// Safaricom Daraja
    Mpesa,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub mode: GatewayMode,

    #[serde(default)]
    pub simulated: SimulatedConfig,

    /// Daraja settings; read from `MPESA_*` variables when absent
    #[serde(default)]
    pub mpesa: Option<MpesaConfig>,
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SADAKA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("reading configuration")?;
        config
            .try_deserialize()
            .context("invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.gateway.mode, GatewayMode::Simulated);
        assert_eq!(config.payments.confirmation_timeout, Duration::from_secs(120));
        assert!(config.catalog.path.is_none());
        assert_eq!(
            config.server.socket_addr().unwrap(),
            "0.0.0.0:3000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_partial_document() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "server": {"port": 8080},
                "payments": {"confirmation_timeout": "3m"},
                "gateway": {"mode": "mpesa"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.payments.confirmation_timeout, Duration::from_secs(180));
        assert_eq!(config.payments.min_amount, 10);
        assert_eq!(config.gateway.mode, GatewayMode::Mpesa);
        assert!(config.gateway.mpesa.is_none());
    }
}
