//! Status tracking
//!
//! Status updates arrive out of band: from the provider's webhook, from
//! polling, or from the simulated gateway. They all go through one `mpsc`
//! channel consumed by the [`StatusTracker`]. The [`ConfirmationSweeper`]
//! polls slow transactions and fails the ones that never confirm.

use crate::config::PaymentConfig;
use crate::gateway::PaymentGateway;
use crate::ledger::{StatusApplication, TransactionLedger};
use sadaka_types::{Result, SadakaError, StatusUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default capacity of the status update channel
pub const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Channel every status source writes to
pub fn status_channel() -> (mpsc::Sender<StatusUpdate>, mpsc::Receiver<StatusUpdate>) {
    mpsc::channel(STATUS_CHANNEL_CAPACITY)
}

/// Applies queued status updates to the ledger
pub struct StatusTracker {
    ledger: Arc<TransactionLedger>,
    updates: mpsc::Receiver<StatusUpdate>,
}

impl StatusTracker {
    pub fn new(ledger: Arc<TransactionLedger>, updates: mpsc::Receiver<StatusUpdate>) -> Self {
        Self { ledger, updates }
    }

    /// Consume updates until every sender is dropped
    pub async fn run(mut self) {
        info!("Status tracker started");
        while let Some(update) = self.updates.recv().await {
            match self.ledger.apply_status_update(&update).await {
                Ok(_) => {}
                // Already logged by the ledger
                Err(SadakaError::UnknownTransaction { .. }) => {}
                Err(err) => {
                    error!(
                        correlation_ref = %update.correlation_ref,
                        error = %err,
                        "Failed to apply status update"
                    );
                }
            }
        }
        info!("Status tracker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Transactions queried at the gateway
    pub polled: usize,
    /// Transactions the poll found settled
    pub settled: usize,
    /// Transactions failed for confirmation timeout
    pub expired: usize,
}

/// Polls unconfirmed transactions and enforces the confirmation window
pub struct ConfirmationSweeper {
    ledger: Arc<TransactionLedger>,
    gateway: Arc<dyn PaymentGateway>,
    poll_after: Duration,
    confirmation_timeout: Duration,
    interval: Duration,
}

impl ConfirmationSweeper {
    pub fn new(
        ledger: Arc<TransactionLedger>,
        gateway: Arc<dyn PaymentGateway>,
        config: &PaymentConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            poll_after: config.poll_after,
            confirmation_timeout: config.confirmation_timeout,
            interval: config.poll_interval,
        }
    }

    /// One pass: poll, then expire
    ///
    /// Poll results go through the ledger before expiry runs, so a payment
    /// the provider confirmed is never failed for timing out.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for transaction in self.ledger.pending_older_than(self.poll_after).await? {
            report.polled += 1;
            let outcome = match self.gateway.query_status(&transaction.correlation_ref).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        transaction_id = %transaction.id,
                        gateway = self.gateway.name(),
                        error = %err,
                        "Status poll failed"
                    );
                    continue;
                }
            };

            let update = StatusUpdate::new(transaction.correlation_ref.clone(), outcome);
            if let Ok(StatusApplication::Applied(_)) = self.ledger.apply_status_update(&update).await {
                report.settled += 1;
            }
        }

        report.expired = self.ledger.expire_pending(self.confirmation_timeout).await?.len();

        if report != SweepReport::default() {
            debug!(
                polled = report.polled,
                settled = report.settled,
                expired = report.expired,
                "Confirmation sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep on an interval until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.confirmation_timeout.as_secs(),
            "Confirmation sweeper started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        error!(error = %err, "Confirmation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Confirmation sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewaySubmission;
    use crate::memory::InMemoryTransactionStore;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use sadaka_types::{
        AccountDetails, Amount, CorrelationRef, FailureReason, PayerId, PaymentMethod,
        PaymentRequest, StatusOutcome, TransactionStatus,
    };

    /// Gateway whose poll answers are set by the test
    #[derive(Default)]
    struct PollGateway {
        answers: DashMap<CorrelationRef, StatusOutcome>,
    }

    #[async_trait]
    impl PaymentGateway for PollGateway {
        fn name(&self) -> &str {
            "poll"
        }

        async fn submit(&self, _: &PaymentRequest) -> Result<GatewaySubmission> {
            Err(SadakaError::internal("not used"))
        }

        async fn query_status(&self, correlation_ref: &CorrelationRef) -> Result<Option<StatusOutcome>> {
            Ok(self.answers.get(correlation_ref).map(|a| a.clone()))
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            payer_id: PayerId::from("member-1"),
            destination: "Tithe".to_string(),
            method: PaymentMethod::LipaNaMpesa,
            amount: Amount::from_shillings(100),
            description: "tithe".to_string(),
            sender: None,
            recipient: AccountDetails::Till {
                till_number: "1234567".to_string(),
            },
            client_reference: None,
        }
    }

    async fn record(ledger: &TransactionLedger, reference: &str) -> sadaka_types::Transaction {
        ledger
            .record_submission(&request(), &GatewaySubmission::new(CorrelationRef::from(reference)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_tracker_applies_updates_and_survives_unknown_refs() {
        let ledger = Arc::new(TransactionLedger::new(Arc::new(InMemoryTransactionStore::new())));
        let tx = record(&ledger, "ws_CO_1").await;

        let (sender, receiver) = status_channel();
        let handle = StatusTracker::new(ledger.clone(), receiver).spawn();

        let completed = StatusOutcome::Completed {
            receipt_number: Some("ABC123".to_string()),
            message: None,
        };
        sender
            .send(StatusUpdate::new(CorrelationRef::from("ws_CO_unknown"), completed.clone()))
            .await
            .unwrap();
        sender
            .send(StatusUpdate::new(CorrelationRef::from("ws_CO_1"), completed))
            .await
            .unwrap();
        drop(sender);
        handle.await.unwrap();

        let settled = ledger.get(&tx.id).await.unwrap();
        assert_eq!(settled.status, TransactionStatus::Completed);
        assert_eq!(settled.mpesa_receipt_number.as_deref(), Some("ABC123"));
    }

    #[tokio::test]
    async fn test_sweep_polls_then_expires_stale_only() {
        let ledger = Arc::new(TransactionLedger::new(Arc::new(InMemoryTransactionStore::new())));
        let gateway = Arc::new(PollGateway::default());

        let confirmed = record(&ledger, "ws_CO_confirmed").await;
        let silent = record(&ledger, "ws_CO_silent").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = record(&ledger, "ws_CO_fresh").await;

        gateway.answers.insert(
            CorrelationRef::from("ws_CO_confirmed"),
            StatusOutcome::Completed {
                receipt_number: Some("QWE789".to_string()),
                message: None,
            },
        );

        let config = PaymentConfig {
            poll_after: Duration::from_millis(20),
            confirmation_timeout: Duration::from_millis(20),
            ..PaymentConfig::default()
        };
        let sweeper = ConfirmationSweeper::new(ledger.clone(), gateway, &config);
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report.polled, 2);
        assert_eq!(report.settled, 1);
        assert_eq!(report.expired, 1);

        assert_eq!(ledger.get(&confirmed.id).await.unwrap().status, TransactionStatus::Completed);
        let silent = ledger.get(&silent.id).await.unwrap();
        assert_eq!(silent.status, TransactionStatus::Failed);
        assert_eq!(silent.failure_reason, Some(FailureReason::ConfirmationTimeout));
        assert_eq!(ledger.get(&fresh.id).await.unwrap().status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let ledger = Arc::new(TransactionLedger::new(Arc::new(InMemoryTransactionStore::new())));
        let config = PaymentConfig {
            poll_interval: Duration::from_millis(5),
            ..PaymentConfig::default()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle =
            ConfirmationSweeper::new(ledger, Arc::new(PollGateway::default()), &config).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
