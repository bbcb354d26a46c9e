//! Payment service facade
//!
//! The whole surface presentation code talks to: catalog lookups, payment
//! submission, the live transaction view and sender-number management.

use crate::catalog::PaymentCatalog;
use crate::config::PaymentConfig;
use crate::gateway::{submit_with_retry, PaymentGateway, RetryPolicy};
use crate::ledger::TransactionLedger;
use crate::memory::{InMemorySenderNumberStore, InMemoryTransactionStore};
use crate::profile::{PayerProfileStore, VerificationDispatcher};
use crate::request::{PaymentInput, PaymentRequestBuilder};
use crate::tracker::{status_channel, ConfirmationSweeper, StatusTracker};
use dashmap::DashSet;
use futures::stream::BoxStream;
use sadaka_types::{
    MethodInfo, PayerId, PaymentDestination, Result, SadakaError, SenderNumber, SenderNumberId,
    StatusUpdate, Transaction, TransactionId,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Entry point for presentation code
pub struct PaymentService {
    catalog: Arc<PaymentCatalog>,
    profiles: Arc<PayerProfileStore>,
    ledger: Arc<TransactionLedger>,
    gateway: Arc<dyn PaymentGateway>,
    builder: PaymentRequestBuilder,
    retry: RetryPolicy,
    updates: mpsc::Sender<StatusUpdate>,
    in_flight: DashSet<(PayerId, String)>,
}

impl PaymentService {
    pub fn new(
        config: &PaymentConfig,
        catalog: Arc<PaymentCatalog>,
        profiles: Arc<PayerProfileStore>,
        ledger: Arc<TransactionLedger>,
        gateway: Arc<dyn PaymentGateway>,
        updates: mpsc::Sender<StatusUpdate>,
    ) -> Self {
        Self {
            builder: PaymentRequestBuilder::new(catalog.clone(), config),
            catalog,
            profiles,
            ledger,
            gateway,
            retry: config.retry.clone(),
            updates,
            in_flight: DashSet::new(),
        }
    }

    pub fn catalog(&self) -> &PaymentCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Sender for out-of-band status updates (webhooks, polls)
    pub fn status_updates(&self) -> mpsc::Sender<StatusUpdate> {
        self.updates.clone()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn list_destinations(&self) -> &[PaymentDestination] {
        self.catalog.list_destinations()
    }

    /// Methods for a destination that the configured gateway can fulfil
    pub fn list_methods(&self, destination: &str) -> Result<Vec<MethodInfo>> {
        let mut methods = self.catalog.list_methods(destination)?;
        methods.retain(|info| self.gateway.supports(info.method));
        Ok(methods)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Validate, submit and record a payment
    ///
    /// Returns the pending transaction once the gateway acknowledged it.
    /// Nothing is recorded when validation or submission fails.
    pub async fn submit_payment(&self, payer_id: &PayerId, input: PaymentInput) -> Result<Transaction> {
        let form = self.builder.check_form(&input)?;
        if !self.gateway.supports(form.method) {
            return Err(SadakaError::UnsupportedMethod {
                destination: form.destination,
                method: form.method.to_string(),
            });
        }

        let sender = if form.method.requires_sender_number() {
            self.resolve_sender(payer_id, &input).await?
        } else {
            None
        };
        let request = self.builder.complete(payer_id, &input, form, sender.as_ref())?;

        let _claim = match &request.client_reference {
            Some(reference) => {
                let claim = InFlight::claim(&self.in_flight, payer_id, reference)?;
                if let Some(existing) = self.ledger.find_by_client_reference(payer_id, reference).await? {
                    info!(
                        transaction_id = %existing.id,
                        client_reference = %reference,
                        "Repeated submission, returning existing transaction"
                    );
                    return Ok(existing);
                }
                Some(claim)
            }
            None => None,
        };

        let submission = submit_with_retry(self.gateway.as_ref(), &request, &self.retry)
            .await
            .map_err(|err| {
                warn!(
                    payer_id = %payer_id,
                    destination = %request.destination,
                    gateway = self.gateway.name(),
                    error = %err,
                    "Payment failed to initiate"
                );
                err
            })?;

        self.ledger.record_submission(&request, &submission).await
    }

    /// Submit on a background task
    ///
    /// Dropping the handle does not cancel the submission.
    pub fn spawn_submit_payment(
        self: &Arc<Self>,
        payer_id: PayerId,
        input: PaymentInput,
    ) -> JoinHandle<Result<Transaction>> {
        let service = self.clone();
        tokio::spawn(async move { service.submit_payment(&payer_id, input).await })
    }

    /// Live newest-first view of the payer's transactions
    pub fn subscribe_transactions(&self, payer_id: PayerId) -> BoxStream<'static, Vec<Transaction>> {
        self.ledger.subscribe(payer_id)
    }

    pub async fn list_transactions(&self, payer_id: &PayerId, limit: Option<usize>) -> Result<Vec<Transaction>> {
        self.ledger.list(payer_id, limit).await
    }

    pub async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction> {
        self.ledger.get(id).await
    }

    async fn resolve_sender(&self, payer_id: &PayerId, input: &PaymentInput) -> Result<Option<SenderNumber>> {
        match input.sender_number_id {
            Some(id) => {
                let number = self.profiles.get_sender_number(payer_id, id).await?;
                if !number.is_verified {
                    return Err(SadakaError::NotVerified {
                        sender_id: id.to_string(),
                    });
                }
                Ok(Some(number))
            }
            None => self.profiles.get_default_sender_number(payer_id).await,
        }
    }

    // =========================================================================
    // Sender numbers
    // =========================================================================

    pub async fn add_sender_number(&self, payer_id: &PayerId, raw_phone: &str) -> Result<SenderNumber> {
        self.profiles.add_sender_number(payer_id, raw_phone).await
    }

    pub async fn resend_verification_code(&self, payer_id: &PayerId, id: SenderNumberId) -> Result<SenderNumber> {
        self.profiles.resend_verification_code(payer_id, id).await
    }

    pub async fn verify_sender_number(
        &self,
        payer_id: &PayerId,
        id: SenderNumberId,
        code: &str,
    ) -> Result<SenderNumber> {
        self.profiles.verify_sender_number(payer_id, id, code).await
    }

    pub async fn remove_sender_number(&self, payer_id: &PayerId, id: SenderNumberId) -> Result<()> {
        self.profiles.remove_sender_number(payer_id, id).await
    }

    pub async fn set_default_sender_number(&self, payer_id: &PayerId, id: SenderNumberId) -> Result<SenderNumber> {
        self.profiles.set_default_sender_number(payer_id, id).await
    }

    pub async fn get_default_sender_number(&self, payer_id: &PayerId) -> Result<Option<SenderNumber>> {
        self.profiles.get_default_sender_number(payer_id).await
    }

    pub async fn list_sender_numbers(&self, payer_id: &PayerId) -> Result<Vec<SenderNumber>> {
        self.profiles.list_sender_numbers(payer_id).await
    }
}

/// A wired service plus the background tasks that keep it current
pub struct PaymentRuntime {
    pub service: Arc<PaymentService>,
    pub tracker: StatusTracker,
    pub sweeper: ConfirmationSweeper,
}

impl PaymentRuntime {
    /// Wire everything on the in-memory stores
    ///
    /// `gateway` receives the status channel so gateways that report outcomes
    /// themselves (the simulator) can feed the tracker.
    pub fn in_memory<F>(
        config: &PaymentConfig,
        catalog: Arc<PaymentCatalog>,
        dispatcher: Arc<dyn VerificationDispatcher>,
        gateway: F,
    ) -> Self
    where
        F: FnOnce(mpsc::Sender<StatusUpdate>) -> Arc<dyn PaymentGateway>,
    {
        let (updates, receiver) = status_channel();
        let gateway = gateway(updates.clone());

        let ledger = Arc::new(TransactionLedger::new(Arc::new(InMemoryTransactionStore::new())));
        let profiles = Arc::new(PayerProfileStore::new(
            Arc::new(InMemorySenderNumberStore::new()),
            dispatcher,
            config.verification_code_ttl,
        ));

        let service = Arc::new(PaymentService::new(
            config,
            catalog,
            profiles,
            ledger.clone(),
            gateway.clone(),
            updates,
        ));

        Self {
            service,
            tracker: StatusTracker::new(ledger.clone(), receiver),
            sweeper: ConfirmationSweeper::new(ledger, gateway, config),
        }
    }
}

/// Marks a client reference as being submitted; released on drop
struct InFlight<'a> {
    set: &'a DashSet<(PayerId, String)>,
    key: (PayerId, String),
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a DashSet<(PayerId, String)>, payer_id: &PayerId, reference: &str) -> Result<Self> {
        let key = (payer_id.clone(), reference.to_string());
        if !set.insert(key.clone()) {
            return Err(SadakaError::DuplicateSubmission {
                client_reference: reference.to_string(),
            });
        }
        Ok(Self { set, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}
