//! Daraja configuration
//!
//! Credentials come from the environment (optionally via a `.env` file);
//! non-secret settings have defaults suitable for the sandbox.

use crate::error::{MpesaError, MpesaResult};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Daraja environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }

    fn parse(value: &str) -> MpesaResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "live" => Ok(Self::Production),
            other => Err(MpesaError::Configuration {
                message: format!("unknown M-Pesa environment {other:?}"),
            }),
        }
    }
}

/// Settings for the Daraja client
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MpesaConfig {
    pub environment: MpesaEnvironment,
    /// Overrides the environment's base URL (stub servers, proxies)
    pub base_url: Option<String>,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Shortcode the STK push is initiated for
    pub business_short_code: String,
    pub passkey: String,
    /// Public URL Daraja posts results to
    pub callback_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Refresh the access token this long before it expires
    #[serde(with = "humantime_serde")]
    pub token_refresh_margin: Duration,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            environment: MpesaEnvironment::Sandbox,
            base_url: None,
            consumer_key: String::new(),
            consumer_secret: String::new(),
            business_short_code: "174379".to_string(), // Daraja sandbox shortcode
            passkey: String::new(),
            callback_url: String::new(),
            request_timeout: Duration::from_secs(30),
            token_refresh_margin: Duration::from_secs(60),
        }
    }
}

impl MpesaConfig {
    /// Load from `MPESA_*` environment variables
    pub fn from_env() -> MpesaResult<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let environment = match std::env::var("MPESA_ENVIRONMENT") {
            Ok(value) => MpesaEnvironment::parse(&value)?,
            Err(_) => defaults.environment,
        };

        let config = Self {
            environment,
            base_url: std::env::var("MPESA_BASE_URL").ok(),
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            business_short_code: std::env::var("MPESA_SHORTCODE")
                .unwrap_or(defaults.business_short_code),
            passkey: required("MPESA_PASSKEY")?,
            callback_url: required("MPESA_CALLBACK_URL")?,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Check everything needed to talk to Daraja is present
    pub fn validate(&self) -> MpesaResult<()> {
        let missing = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("business_short_code", &self.business_short_code),
            ("passkey", &self.passkey),
            ("callback_url", &self.callback_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(MpesaError::Configuration {
                message: format!("missing {}", missing.join(", ")),
            });
        }
        if !self.callback_url.starts_with("https://") && !self.callback_url.starts_with("http://") {
            return Err(MpesaError::Configuration {
                message: "callback_url must be an http(s) URL".to_string(),
            });
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
            .trim_end_matches('/')
    }
}

impl fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url())
            .field("consumer_key", &mask(&self.consumer_key))
            .field("consumer_secret", &"<redacted>")
            .field("business_short_code", &self.business_short_code)
            .field("passkey", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn required(name: &str) -> MpesaResult<String> {
    std::env::var(name).map_err(|_| MpesaError::Configuration {
        message: format!("{name} is not set"),
    })
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> MpesaConfig {
        MpesaConfig {
            consumer_key: "key-1234567".to_string(),
            consumer_secret: "secret".to_string(),
            passkey: "passkey".to_string(),
            callback_url: "https://example.org/api/v1/mpesa/callback".to_string(),
            ..MpesaConfig::default()
        }
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        assert!(complete().validate().is_ok());

        let err = MpesaConfig::default().validate().unwrap_err();
        let MpesaError::Configuration { message } = err else {
            panic!("expected configuration error");
        };
        assert!(message.contains("consumer_key"));
        assert!(message.contains("callback_url"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let shown = format!("{:?}", complete());
        assert!(!shown.contains("secret\""));
        assert!(!shown.contains("passkey\""));
        assert!(shown.contains("key-****"));
    }

    #[test]
    fn test_base_url_override() {
        let config = MpesaConfig {
            base_url: Some("http://127.0.0.1:9000/".to_string()),
            ..complete()
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        assert_eq!(complete().base_url(), "https://sandbox.safaricom.co.ke");
    }
}
