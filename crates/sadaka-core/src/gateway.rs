//! Gateway abstraction and retry policy
//!
//! A [`PaymentGateway`] turns a validated [`PaymentRequest`] into a
//! provider-issued correlation reference and can be asked later how that
//! request ended up. Transport failures get one bounded automatic retry;
//! provider rejections are surfaced immediately.

use async_trait::async_trait;
use sadaka_types::{CorrelationRef, PaymentMethod, PaymentRequest, Result, StatusOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on automatic resubmissions of one request
pub const MAX_AUTOMATIC_RETRIES: u32 = 1;

/// Provider acknowledgment of a submitted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySubmission {
    /// Reference later callbacks and polls are matched on
    pub correlation_ref: CorrelationRef,
    /// Text the provider wants shown to the payer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}

impl GatewaySubmission {
    pub fn new(correlation_ref: CorrelationRef) -> Self {
        Self {
            correlation_ref,
            customer_message: None,
        }
    }
}

/// Mobile-money provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Whether requests with this method can be fulfilled
    ///
    /// Push gateways only handle the methods that prompt a sender number.
    fn supports(&self, method: PaymentMethod) -> bool {
        method.requires_sender_number()
    }

    /// Submit a push payment
    ///
    /// Fails with `GatewayUnavailable` on transport problems and
    /// `GatewayRejected` when the provider refuses the request.
    async fn submit(&self, request: &PaymentRequest) -> Result<GatewaySubmission>;

    /// Ask the provider how a submission ended
    ///
    /// `Ok(None)` means the payer has not acted on the prompt yet.
    async fn query_status(&self, correlation_ref: &CorrelationRef) -> Result<Option<StatusOutcome>>;
}

/// Automatic retry of transient gateway failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Resubmissions after the first attempt, capped at [`MAX_AUTOMATIC_RETRIES`]
    pub max_retries: u32,
    /// Pause before resubmitting
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Never resubmit
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    fn allowed_retries(&self) -> u32 {
        self.max_retries.min(MAX_AUTOMATIC_RETRIES)
    }
}

/// Submit, retrying retriable failures per the policy
pub async fn submit_with_retry(
    gateway: &dyn PaymentGateway,
    request: &PaymentRequest,
    policy: &RetryPolicy,
) -> Result<GatewaySubmission> {
    let mut attempt = 0;
    loop {
        match gateway.submit(request).await {
            Ok(submission) => {
                debug!(
                    gateway = gateway.name(),
                    correlation_ref = %submission.correlation_ref,
                    attempt,
                    "Gateway accepted payment request"
                );
                return Ok(submission);
            }
            Err(err) if err.is_retriable() && attempt < policy.allowed_retries() => {
                attempt += 1;
                warn!(
                    gateway = gateway.name(),
                    attempt,
                    error = %err,
                    "Gateway submission failed, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
