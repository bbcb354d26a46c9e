//! In-memory stores
//!
//! `DashMap`-backed implementations of the persistence traits, used by tests,
//! local development and the single-node server. Changes are published on a
//! `tokio::sync::broadcast` channel.

use crate::store::{sort_newest_first, CasOutcome, SenderNumberStore, TransactionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sadaka_types::{
    CorrelationRef, PayerId, Result, SadakaError, SenderNumber, StatusOutcome, Transaction,
    TransactionId,
};
use tokio::sync::broadcast;

const CHANGE_FEED_CAPACITY: usize = 1024;

/// Transaction store held in process memory
pub struct InMemoryTransactionStore {
    transactions: DashMap<TransactionId, Transaction>,
    by_correlation: DashMap<CorrelationRef, TransactionId>,
    changes: broadcast::Sender<Transaction>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            transactions: DashMap::new(),
            by_correlation: DashMap::new(),
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn publish(&self, transaction: &Transaction) {
        // No subscribers is fine
        let _ = self.changes.send(transaction.clone());
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, transaction: Transaction) -> Result<Transaction> {
        use dashmap::mapref::entry::Entry;

        match self.by_correlation.entry(transaction.correlation_ref.clone()) {
            Entry::Occupied(_) => {
                return Err(SadakaError::storage(format!(
                    "correlation reference {} already recorded",
                    transaction.correlation_ref
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(transaction.id);
            }
        }
        self.transactions.insert(transaction.id, transaction.clone());
        self.publish(&transaction);
        Ok(transaction)
    }

    async fn update_if_pending(
        &self,
        id: &TransactionId,
        outcome: &StatusOutcome,
    ) -> Result<CasOutcome> {
        let result = {
            let mut entry =
                self.transactions
                    .get_mut(id)
                    .ok_or_else(|| SadakaError::TransactionNotFound {
                        transaction_id: id.to_string(),
                    })?;
            match entry.settled(outcome, Utc::now()) {
                Some(next) => {
                    *entry = next.clone();
                    CasOutcome::Applied(next)
                }
                None => CasOutcome::AlreadyTerminal(entry.clone()),
            }
        };

        if let CasOutcome::Applied(transaction) = &result {
            self.publish(transaction);
        }
        Ok(result)
    }

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_correlation(
        &self,
        correlation_ref: &CorrelationRef,
    ) -> Result<Option<Transaction>> {
        let Some(id) = self.by_correlation.get(correlation_ref).map(|entry| *entry) else {
            return Ok(None);
        };
        self.get(&id).await
    }

    async fn find_by_client_reference(
        &self,
        payer_id: &PayerId,
        client_reference: &str,
    ) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .find(|entry| {
                entry.payer_id == *payer_id
                    && entry.client_reference.as_deref() == Some(client_reference)
            })
            .map(|entry| entry.clone()))
    }

    async fn query_by_payer(
        &self,
        payer_id: &PayerId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| entry.payer_id == *payer_id)
            .map(|entry| entry.clone())
            .collect();
        sort_newest_first(&mut transactions);
        if let Some(limit) = limit {
            transactions.truncate(limit);
        }
        Ok(transactions)
    }

    async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let mut pending: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| !entry.is_terminal() && entry.created_at < cutoff)
            .map(|entry| entry.clone())
            .collect();
        pending.sort_by_key(|tx| tx.created_at);
        Ok(pending)
    }

    fn subscribe(&self) -> broadcast::Receiver<Transaction> {
        self.changes.subscribe()
    }
}

/// Sender-number documents held in process memory
#[derive(Default)]
pub struct InMemorySenderNumberStore {
    profiles: DashMap<PayerId, Vec<SenderNumber>>,
}

impl InMemorySenderNumberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SenderNumberStore for InMemorySenderNumberStore {
    async fn load(&self, payer_id: &PayerId) -> Result<Vec<SenderNumber>> {
        Ok(self
            .profiles
            .get(payer_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn save(&self, payer_id: &PayerId, numbers: Vec<SenderNumber>) -> Result<()> {
        if numbers.is_empty() {
            self.profiles.remove(payer_id);
        } else {
            self.profiles.insert(payer_id.clone(), numbers);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sadaka_types::{
        AccountDetails, Amount, FailureReason, PaymentMethod, PaymentRequest, TransactionStatus,
    };

    fn pending(payer: &str, correlation: &str) -> Transaction {
        let request = PaymentRequest {
            payer_id: PayerId::from(payer),
            destination: "Tithe".to_string(),
            method: PaymentMethod::LipaNaMpesa,
            amount: Amount::from_shillings(100),
            description: "tithe".to_string(),
            sender: None,
            recipient: AccountDetails::Till {
                till_number: "1234567".to_string(),
            },
            client_reference: None,
        };
        Transaction::pending(&request, CorrelationRef::from(correlation))
    }

    fn completed(receipt: &str) -> StatusOutcome {
        StatusOutcome::Completed {
            receipt_number: Some(receipt.to_string()),
            message: None,
        }
    }

    #[tokio::test]
    async fn test_update_if_pending_applies_once() {
        let store = InMemoryTransactionStore::new();
        let tx = store.create(pending("member-1", "ws_CO_1")).await.unwrap();

        let first = store.update_if_pending(&tx.id, &completed("ABC123")).await.unwrap();
        assert!(matches!(first, CasOutcome::Applied(ref t) if t.status == TransactionStatus::Completed));

        let second = store
            .update_if_pending(
                &tx.id,
                &StatusOutcome::Failed {
                    reason: FailureReason::Cancelled,
                    message: None,
                },
            )
            .await
            .unwrap();
        match second {
            CasOutcome::AlreadyTerminal(current) => {
                assert_eq!(current.status, TransactionStatus::Completed);
                assert_eq!(current.mpesa_receipt_number.as_deref(), Some("ABC123"));
                assert!(current.failure_reason.is_none());
            }
            other => panic!("expected AlreadyTerminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_racing_updates_apply_exactly_one() {
        let store = std::sync::Arc::new(InMemoryTransactionStore::new());
        let tx = store.create(pending("member-1", "ws_CO_1")).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let id = tx.id;
                tokio::spawn(async move {
                    store
                        .update_if_pending(&id, &completed(&format!("R{i}")))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), CasOutcome::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_duplicate_correlation_rejected() {
        let store = InMemoryTransactionStore::new();
        store.create(pending("member-1", "ws_CO_1")).await.unwrap();
        assert!(store.create(pending("member-1", "ws_CO_1")).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_query_by_payer_newest_first() {
        let store = InMemoryTransactionStore::new();
        let mut older = pending("member-1", "ws_CO_1");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        store.create(older.clone()).await.unwrap();
        let newer = store.create(pending("member-1", "ws_CO_2")).await.unwrap();
        store.create(pending("member-2", "ws_CO_3")).await.unwrap();

        let listed = store.query_by_payer(&PayerId::from("member-1"), None).await.unwrap();
        assert_eq!(listed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

        let limited = store.query_by_payer(&PayerId::from("member-1"), Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_change_feed_publishes_creates_and_updates() {
        let store = InMemoryTransactionStore::new();
        let mut feed = store.subscribe();

        let tx = store.create(pending("member-1", "ws_CO_1")).await.unwrap();
        store.update_if_pending(&tx.id, &completed("ABC123")).await.unwrap();

        assert_eq!(feed.recv().await.unwrap().status, TransactionStatus::Pending);
        assert_eq!(feed.recv().await.unwrap().status, TransactionStatus::Completed);
    }
}
