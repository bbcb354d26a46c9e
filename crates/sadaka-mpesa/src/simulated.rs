//! Simulated gateway
//!
//! Accepts every push, then confirms it after a fixed delay by sending a
//! completion through the status channel, the same way a Daraja callback
//! would arrive. Used for local development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use sadaka_core::{GatewaySubmission, PaymentGateway};
use sadaka_types::{
    CorrelationRef, PaymentRequest, Result, SadakaError, StatusOutcome, StatusUpdate,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RECEIPT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RECEIPT_SUFFIX_LEN: usize = 8;

/// Simulator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Time between accepting a push and confirming it
    #[serde(with = "humantime_serde")]
    pub completion_delay: Duration,
    /// Name shown in confirmation messages
    pub organization_name: String,
    /// How long a confirmed outcome stays answerable to status queries
    #[serde(with = "humantime_serde")]
    pub outcome_retention: Duration,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            completion_delay: Duration::from_secs(3),
            organization_name: "Rongai Church".to_string(),
            outcome_retention: Duration::from_secs(600),
        }
    }
}

/// Gateway that confirms every payment on its own
pub struct SimulatedGateway {
    config: SimulatedConfig,
    updates: mpsc::Sender<StatusUpdate>,
    outcomes: Arc<DashMap<CorrelationRef, StatusOutcome>>,
}

impl SimulatedGateway {
    pub fn new(config: SimulatedConfig, updates: mpsc::Sender<StatusUpdate>) -> Self {
        Self {
            config,
            updates,
            outcomes: Arc::new(DashMap::new()),
        }
    }

    fn receipt_number() -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..RECEIPT_SUFFIX_LEN)
            .map(|_| RECEIPT_ALPHABET[rng.gen_range(0..RECEIPT_ALPHABET.len())] as char)
            .collect();
        format!("MPESA{suffix}")
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn submit(&self, request: &PaymentRequest) -> Result<GatewaySubmission> {
        if !request.method.is_push_payment() || request.sender.is_none() {
            return Err(SadakaError::GatewayRejected {
                code: "UNSUPPORTED_METHOD".to_string(),
                message: format!("{} is not an STK push method", request.method),
            });
        }

        let correlation_ref = CorrelationRef::new(format!("ws_CO_SIM_{}", ulid::Ulid::new()));
        let outcome = StatusOutcome::Completed {
            receipt_number: Some(Self::receipt_number()),
            message: Some(format!(
                "MPESA Confirmed. You sent Ksh {} to {}.",
                request.amount.shillings(),
                self.config.organization_name
            )),
        };

        debug!(
            correlation_ref = %correlation_ref,
            delay_ms = self.config.completion_delay.as_millis() as u64,
            "Simulated push accepted"
        );

        let delay = self.config.completion_delay;
        let retention = self.config.outcome_retention;
        let updates = self.updates.clone();
        let outcomes = self.outcomes.clone();
        let reference = correlation_ref.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            outcomes.insert(reference.clone(), outcome.clone());
            info!(correlation_ref = %reference, "Simulated payment confirmed");
            if updates
                .send(StatusUpdate::new(reference.clone(), outcome))
                .await
                .is_err()
            {
                warn!("Status channel closed; simulated confirmation dropped");
            }

            tokio::time::sleep(retention).await;
            outcomes.remove(&reference);
        });

        Ok(GatewaySubmission {
            correlation_ref,
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }

    async fn query_status(&self, correlation_ref: &CorrelationRef) -> Result<Option<StatusOutcome>> {
        Ok(self.outcomes.get(correlation_ref).map(|entry| entry.value().clone()))
    }
}
