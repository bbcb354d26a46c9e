//! Daraja gateway client
//!
//! Implements [`PaymentGateway`] over the Daraja REST API: STK push for
//! submission and the STK query endpoint for the poll fallback.

use crate::auth::TokenCache;
use crate::config::MpesaConfig;
use crate::error::{MpesaError, MpesaResult};
use crate::stk::{
    DarajaErrorBody, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse,
    QUERY_STILL_PROCESSING, STK_PUSH_PATH, STK_QUERY_PATH,
};
use async_trait::async_trait;
use chrono::Utc;
use sadaka_core::{GatewaySubmission, PaymentGateway};
use sadaka_types::{CorrelationRef, PaymentRequest, Result, StatusOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

/// M-Pesa STK push gateway
pub struct MpesaGateway {
    config: MpesaConfig,
    client: reqwest::Client,
    tokens: TokenCache,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> MpesaResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MpesaError::Configuration {
                message: format!("HTTP client: {e}"),
            })?;
        let tokens = TokenCache::new(client.clone(), &config);
        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    pub fn from_env() -> MpesaResult<Self> {
        Self::new(MpesaConfig::from_env()?)
    }

    /// Submit an STK push
    pub async fn stk_push(&self, request: &PaymentRequest) -> MpesaResult<StkPushResponse> {
        let body = StkPushRequest::build(
            request,
            &self.config.business_short_code,
            &self.config.passkey,
            &self.config.callback_url,
            Utc::now(),
        )?;

        let response: StkPushResponse = self.post(STK_PUSH_PATH, &body).await?;
        if response.response_code.trim() != "0" {
            return Err(MpesaError::Rejected {
                code: response.response_code,
                message: response.response_description,
            });
        }
        Ok(response)
    }

    /// Query the result of an STK push
    pub async fn stk_query(&self, checkout_request_id: &str) -> MpesaResult<Option<StatusOutcome>> {
        let body = StkQueryRequest::build(
            &self.config.business_short_code,
            &self.config.passkey,
            checkout_request_id,
            Utc::now(),
        );

        match self.post::<_, StkQueryResponse>(STK_QUERY_PATH, &body).await {
            Ok(response) => response.outcome(),
            Err(MpesaError::Rejected { code, .. }) if code == QUERY_STILL_PROCESSING => Ok(None),
            Err(MpesaError::Http { status: 500, body }) if body.contains(QUERY_STILL_PROCESSING) => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> MpesaResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{}", self.config.base_url(), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(MpesaError::from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(MpesaError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.is_client_error() {
                if let Ok(error) = serde_json::from_str::<DarajaErrorBody>(&text) {
                    return Err(MpesaError::Rejected {
                        code: error.error_code,
                        message: error.error_message,
                    });
                }
            }
            return Err(MpesaError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        response.json::<R>().await.map_err(|e| MpesaError::InvalidResponse {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    fn name(&self) -> &str {
        "mpesa"
    }

    async fn submit(&self, request: &PaymentRequest) -> Result<GatewaySubmission> {
        debug!(
            destination = %request.destination,
            method = %request.method,
            amount = request.amount.shillings(),
            "Sending STK push"
        );

        let response = self.stk_push(request).await.map_err(|err| {
            warn!(error = %err, "STK push failed");
            err
        })?;

        info!(
            checkout_request_id = %response.checkout_request_id,
            merchant_request_id = %response.merchant_request_id,
            "STK push accepted"
        );
        Ok(GatewaySubmission {
            correlation_ref: CorrelationRef::new(response.checkout_request_id),
            customer_message: response.customer_message,
        })
    }

    async fn query_status(&self, correlation_ref: &CorrelationRef) -> Result<Option<StatusOutcome>> {
        Ok(self.stk_query(correlation_ref.as_str()).await?)
    }
}
