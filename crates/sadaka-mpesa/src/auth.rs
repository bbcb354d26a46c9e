//! OAuth2 access tokens
//!
//! Daraja issues client-credentials tokens valid for about an hour. The cache
//! hands out the current token until it is within the refresh margin of
//! expiring. Refreshes happen behind an async mutex, so concurrent callers
//! wait for one fetch instead of each requesting their own token.

use crate::config::MpesaConfig;
use crate::error::{MpesaError, MpesaResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Token endpoint path
pub const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Daraja sends this as a string
    #[serde(deserialize_with = "seconds_from_string_or_number")]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Shared access-token cache
pub struct TokenCache {
    client: reqwest::Client,
    url: String,
    basic_auth: String,
    refresh_margin: Duration,
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(client: reqwest::Client, config: &MpesaConfig) -> Self {
        let credentials = format!("{}:{}", config.consumer_key, config.consumer_secret);
        Self {
            client,
            url: format!("{}{}", config.base_url(), TOKEN_PATH),
            basic_auth: format!("Basic {}", STANDARD.encode(credentials)),
            refresh_margin: config.token_refresh_margin,
            current: Mutex::new(None),
        }
    }

    /// A valid bearer token, fetched if needed
    pub async fn access_token(&self) -> MpesaResult<String> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fetched = self.fetch().await?;
        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(self.refresh_margin);
        debug!(expires_in = fetched.expires_in, "Fetched Daraja access token");

        let value = fetched.access_token;
        *current = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    /// Drop the cached token after Daraja refused it
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    async fn fetch(&self) -> MpesaResult<TokenResponse> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::AUTHORIZATION, &self.basic_auth)
            .send()
            .await
            .map_err(MpesaError::from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(MpesaError::Configuration {
                message: "Daraja refused the consumer key and secret".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MpesaError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| MpesaError::InvalidResponse {
                message: format!("token response: {e}"),
            })
    }
}

fn seconds_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(value) => Ok(value),
        Seconds::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_accepts_string_expiry() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#).unwrap();
        assert_eq!(parsed.expires_in, 3599);

        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":3599}"#).unwrap();
        assert_eq!(parsed.expires_in, 3599);
    }
}
