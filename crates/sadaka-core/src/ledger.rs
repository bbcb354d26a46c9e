//! Transaction Ledger
//!
//! Single source of truth for submitted payments. Records are created only
//! after the gateway acknowledged a submission and are moved to a terminal
//! state at most once, through the store's compare-and-set.

use crate::gateway::GatewaySubmission;
use crate::store::{sort_newest_first, CasOutcome, TransactionStore};
use chrono::Utc;
use futures::stream::BoxStream;
use sadaka_types::{
    FailureReason, PayerId, PaymentRequest, Result, SadakaError, StatusOutcome, StatusUpdate,
    Transaction, TransactionId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What happened to a status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusApplication {
    /// The pending transaction moved to a terminal state
    Applied(Transaction),
    /// The transaction was already terminal; nothing changed
    Duplicate(Transaction),
}

impl StatusApplication {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Applied(tx) | Self::Duplicate(tx) => tx,
        }
    }
}

/// Ledger over a transaction store
#[derive(Clone)]
pub struct TransactionLedger {
    store: Arc<dyn TransactionStore>,
}

impl TransactionLedger {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Record a submission the gateway acknowledged
    pub async fn record_submission(
        &self,
        request: &PaymentRequest,
        submission: &GatewaySubmission,
    ) -> Result<Transaction> {
        let transaction = Transaction::pending(request, submission.correlation_ref.clone());
        let transaction = self.store.create(transaction).await?;

        info!(
            transaction_id = %transaction.id,
            payer_id = %transaction.payer_id,
            correlation_ref = %transaction.correlation_ref,
            destination = %transaction.destination,
            method = %transaction.method,
            amount = transaction.amount.shillings(),
            "Payment submitted, awaiting confirmation"
        );
        Ok(transaction)
    }

    /// Apply an out-of-band status update
    pub async fn apply_status_update(&self, update: &StatusUpdate) -> Result<StatusApplication> {
        let Some(transaction) = self.store.find_by_correlation(&update.correlation_ref).await? else {
            warn!(
                correlation_ref = %update.correlation_ref,
                status = %update.outcome.status(),
                "Status update for unknown transaction"
            );
            return Err(SadakaError::UnknownTransaction {
                correlation_ref: update.correlation_ref.to_string(),
            });
        };

        match self.store.update_if_pending(&transaction.id, &update.outcome).await? {
            CasOutcome::Applied(transaction) => {
                info!(
                    transaction_id = %transaction.id,
                    status = %transaction.status,
                    receipt = ?transaction.mpesa_receipt_number,
                    "Transaction settled"
                );
                Ok(StatusApplication::Applied(transaction))
            }
            CasOutcome::AlreadyTerminal(transaction) => {
                warn!(
                    transaction_id = %transaction.id,
                    correlation_ref = %update.correlation_ref,
                    current = %transaction.status,
                    attempted = %update.outcome.status(),
                    "Ignoring status update for settled transaction"
                );
                Ok(StatusApplication::Duplicate(transaction))
            }
        }
    }

    /// Fail every transaction still pending after `timeout`
    pub async fn expire_pending(&self, timeout: Duration) -> Result<Vec<Transaction>> {
        let window = chrono::Duration::from_std(timeout)
            .map_err(|e| SadakaError::internal(format!("confirmation window out of range: {e}")))?;
        let stale = self.store.pending_older_than(Utc::now() - window).await?;

        let outcome = StatusOutcome::Failed {
            reason: FailureReason::ConfirmationTimeout,
            message: Some(format!(
                "No confirmation received within {} seconds",
                timeout.as_secs()
            )),
        };

        let mut expired = Vec::new();
        for transaction in stale {
            match self.store.update_if_pending(&transaction.id, &outcome).await? {
                CasOutcome::Applied(transaction) => {
                    info!(
                        transaction_id = %transaction.id,
                        correlation_ref = %transaction.correlation_ref,
                        "Transaction failed after confirmation timeout"
                    );
                    expired.push(transaction);
                }
                CasOutcome::AlreadyTerminal(_) => {
                    debug!(transaction_id = %transaction.id, "Settled before it could expire");
                }
            }
        }
        Ok(expired)
    }

    /// A payer's transactions, newest first
    pub async fn list(&self, payer_id: &PayerId, limit: Option<usize>) -> Result<Vec<Transaction>> {
        self.store.query_by_payer(payer_id, limit).await
    }

    pub async fn get(&self, id: &TransactionId) -> Result<Transaction> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SadakaError::TransactionNotFound {
                transaction_id: id.to_string(),
            })
    }

    pub async fn find_by_client_reference(
        &self,
        payer_id: &PayerId,
        client_reference: &str,
    ) -> Result<Option<Transaction>> {
        self.store.find_by_client_reference(payer_id, client_reference).await
    }

    /// Pending transactions older than `age`, oldest first
    pub async fn pending_older_than(&self, age: Duration) -> Result<Vec<Transaction>> {
        let age = chrono::Duration::from_std(age)
            .map_err(|e| SadakaError::internal(format!("poll delay out of range: {e}")))?;
        self.store.pending_older_than(Utc::now() - age).await
    }

    /// Live newest-first view of a payer's transactions
    ///
    /// Yields the current list first, then an updated list after every change
    /// to one of the payer's transactions. Changes are merged into the last
    /// snapshot; the store is only re-read after the change feed lagged.
    pub fn subscribe(&self, payer_id: PayerId) -> BoxStream<'static, Vec<Transaction>> {
        let store = self.store.clone();
        // Subscribe before the initial read so no change falls in between
        let mut changes = store.subscribe();

        Box::pin(async_stream::stream! {
            let mut snapshot = match store.query_by_payer(&payer_id, None).await {
                Ok(transactions) => transactions,
                Err(err) => {
                    warn!(payer_id = %payer_id, error = %err, "Initial transaction load failed");
                    Vec::new()
                }
            };
            yield snapshot.clone();

            loop {
                match changes.recv().await {
                    Ok(changed) => {
                        if changed.payer_id != payer_id {
                            continue;
                        }
                        upsert(&mut snapshot, changed);
                        yield snapshot.clone();
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(payer_id = %payer_id, skipped, "Change feed lagged, resyncing");
                        match store.query_by_payer(&payer_id, None).await {
                            Ok(transactions) => {
                                snapshot = transactions;
                                yield snapshot.clone();
                            }
                            Err(err) => {
                                warn!(payer_id = %payer_id, error = %err, "Resync failed");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Merge a change into the snapshot
///
/// A settled entry is never replaced by a pending one; the creation event
/// can arrive after a fast callback's settlement.
fn upsert(snapshot: &mut Vec<Transaction>, changed: Transaction) {
    match snapshot.iter_mut().find(|tx| tx.id == changed.id) {
        Some(existing) if existing.status.is_terminal() && !changed.status.is_terminal() => {}
        Some(existing) => *existing = changed,
        None => {
            snapshot.push(changed);
            sort_newest_first(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransactionStore;
    use futures::StreamExt;
    use sadaka_types::{
        AccountDetails, Amount, CorrelationRef, PaymentMethod, PhoneNumber, TransactionStatus,
    };

    fn ledger() -> TransactionLedger {
        TransactionLedger::new(Arc::new(InMemoryTransactionStore::new()))
    }

    fn request(payer: &str) -> PaymentRequest {
        PaymentRequest {
            payer_id: PayerId::from(payer),
            destination: "Offering".to_string(),
            method: PaymentMethod::SendMoney,
            amount: Amount::from_shillings(200),
            description: "offering".to_string(),
            sender: Some(PhoneNumber::normalize("0712345678").unwrap()),
            recipient: AccountDetails::SendMoney {
                phone_number: PhoneNumber::normalize("0110490333").unwrap(),
            },
            client_reference: None,
        }
    }

    fn submission(reference: &str) -> GatewaySubmission {
        GatewaySubmission::new(CorrelationRef::from(reference))
    }

    fn completed(reference: &str, receipt: &str) -> StatusUpdate {
        StatusUpdate::new(
            CorrelationRef::from(reference),
            StatusOutcome::Completed {
                receipt_number: Some(receipt.to_string()),
                message: Some(format!("{receipt} Confirmed.")),
            },
        )
    }

    #[tokio::test]
    async fn test_record_then_complete() {
        let ledger = ledger();
        let tx = ledger
            .record_submission(&request("member-1"), &submission("ws_CO_1"))
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        let applied = ledger.apply_status_update(&completed("ws_CO_1", "ABC123")).await.unwrap();
        let StatusApplication::Applied(done) = applied else {
            panic!("expected Applied");
        };
        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(done.mpesa_receipt_number.as_deref(), Some("ABC123"));
        assert_eq!(done.confirmation_message.as_deref(), Some("ABC123 Confirmed."));
    }

    #[test]
    fn test_snapshot_keeps_settled_entry_over_late_pending_event() {
        let pending = Transaction::pending(&request("member-1"), CorrelationRef::from("ws_CO_9"));
        let outcome = StatusOutcome::Completed {
            receipt_number: Some("QWE123".to_string()),
            message: None,
        };
        let settled = pending.settled(&outcome, Utc::now()).unwrap();

        let mut snapshot = vec![settled];
        upsert(&mut snapshot, pending);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, TransactionStatus::Completed);
        assert_eq!(snapshot[0].mpesa_receipt_number.as_deref(), Some("QWE123"));
    }

    #[tokio::test]
    async fn test_unknown_correlation() {
        let err = ledger()
            .apply_status_update(&completed("ws_CO_missing", "ABC123"))
            .await
            .unwrap_err();
        assert!(matches!(err, SadakaError::UnknownTransaction { .. }));
    }

    #[tokio::test]
    async fn test_terminal_state_is_immutable() {
        let ledger = ledger();
        let tx = ledger
            .record_submission(&request("member-1"), &submission("ws_CO_1"))
            .await
            .unwrap();
        ledger.apply_status_update(&completed("ws_CO_1", "ABC123")).await.unwrap();

        let later = [
            completed("ws_CO_1", "ZZZ999"),
            StatusUpdate::new(
                CorrelationRef::from("ws_CO_1"),
                StatusOutcome::Failed {
                    reason: FailureReason::Cancelled,
                    message: Some("Request cancelled by user".to_string()),
                },
            ),
        ];
        for update in later {
            let result = ledger.apply_status_update(&update).await.unwrap();
            assert!(matches!(result, StatusApplication::Duplicate(_)));
        }

        let current = ledger.get(&tx.id).await.unwrap();
        assert_eq!(current.status, TransactionStatus::Completed);
        assert_eq!(current.mpesa_receipt_number.as_deref(), Some("ABC123"));
        assert!(current.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_expire_pending() {
        let ledger = ledger();
        let stale = ledger
            .record_submission(&request("member-1"), &submission("ws_CO_old"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = ledger
            .record_submission(&request("member-1"), &submission("ws_CO_new"))
            .await
            .unwrap();

        let expired = ledger.expire_pending(Duration::from_millis(10)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_eq!(expired[0].failure_reason, Some(FailureReason::ConfirmationTimeout));

        assert_eq!(ledger.get(&fresh.id).await.unwrap().status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_subscribe_reflects_changes_without_requery() {
        let ledger = ledger();
        let first = ledger
            .record_submission(&request("member-1"), &submission("ws_CO_1"))
            .await
            .unwrap();

        let mut feed = ledger.subscribe(PayerId::from("member-1"));
        let initial = feed.next().await.unwrap();
        assert_eq!(initial.len(), 1);

        // Another payer's activity is filtered out
        ledger
            .record_submission(&request("member-2"), &submission("ws_CO_other"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = ledger
            .record_submission(&request("member-1"), &submission("ws_CO_2"))
            .await
            .unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot.iter().map(|t| t.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        ledger.apply_status_update(&completed("ws_CO_1", "ABC123")).await.unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id, first.id);
        assert_eq!(snapshot[1].mpesa_receipt_number.as_deref(), Some("ABC123"));
    }
}
