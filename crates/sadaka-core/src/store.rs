//! Persistence boundary
//!
//! The core only needs a handful of capabilities from its document store. The
//! compare-and-set in [`TransactionStore::update_if_pending`] is what keeps a
//! racing or repeated callback from applying two terminal transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sadaka_types::{
    CorrelationRef, PayerId, Result, SenderNumber, StatusOutcome, Transaction, TransactionId,
};
use tokio::sync::broadcast;

/// Result of a conditional status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The record was pending and now holds the outcome
    Applied(Transaction),
    /// The record was already terminal and was left untouched
    AlreadyTerminal(Transaction),
}

/// Durable transaction records
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new record. Correlation references are unique.
    async fn create(&self, transaction: Transaction) -> Result<Transaction>;

    /// Apply a terminal outcome only if the record is still pending
    ///
    /// The check and the replacement are one atomic step. Every terminal field
    /// is written in the same replacement.
    async fn update_if_pending(
        &self,
        id: &TransactionId,
        outcome: &StatusOutcome,
    ) -> Result<CasOutcome>;

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>>;

    async fn find_by_correlation(&self, correlation_ref: &CorrelationRef)
        -> Result<Option<Transaction>>;

    async fn find_by_client_reference(
        &self,
        payer_id: &PayerId,
        client_reference: &str,
    ) -> Result<Option<Transaction>>;

    /// A payer's transactions, newest first
    async fn query_by_payer(&self, payer_id: &PayerId, limit: Option<usize>)
        -> Result<Vec<Transaction>>;

    /// Pending transactions created before `cutoff`, oldest first
    async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>>;

    /// Feed of every created or changed record
    fn subscribe(&self) -> broadcast::Receiver<Transaction>;
}

/// Per-payer sender-number documents
#[async_trait]
pub trait SenderNumberStore: Send + Sync {
    /// All numbers for a payer, oldest first
    async fn load(&self, payer_id: &PayerId) -> Result<Vec<SenderNumber>>;

    /// Replace the payer's whole document
    async fn save(&self, payer_id: &PayerId, numbers: Vec<SenderNumber>) -> Result<()>;
}

/// Newest-first ordering used by every transaction listing
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
