//! Payment requests, transactions and status updates
//!
//! A [`PaymentRequest`] is validated intent that is never persisted. Once the
//! gateway acknowledges it, it becomes a [`Transaction`] in `pending` status,
//! and asynchronous [`StatusUpdate`]s move it to a terminal state exactly once.

use crate::{AccountDetails, Amount, CorrelationRef, PayerId, PaymentMethod, PhoneNumber, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated, not yet submitted payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payer_id: PayerId,
    pub destination: String,
    pub method: PaymentMethod,
    pub amount: Amount,
    pub description: String,
    /// Verified number the push prompt goes to (absent for bank transfers)
    pub sender: Option<PhoneNumber>,
    /// Recipient account resolved from the catalog
    pub recipient: AccountDetails,
    /// Caller-supplied idempotency key
    pub client_reference: Option<String>,
}

/// Lifecycle status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Submitted, awaiting gateway confirmation
    Pending,
    /// Gateway confirmed the payment
    Completed,
    /// Gateway reported failure or confirmation timed out
    Failed,
}

impl TransactionStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transaction failed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Provider declined (insufficient funds, wrong PIN, ...)
    Rejected { code: String },
    /// Payer dismissed the handset prompt
    Cancelled,
    /// No confirmation arrived within the configured window
    ConfirmationTimeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { code } => write!(f, "rejected by gateway (code {code})"),
            Self::Cancelled => f.write_str("cancelled by payer"),
            Self::ConfirmationTimeout => f.write_str("confirmation timed out"),
        }
    }
}

/// Terminal outcome reported by the gateway (or the timeout sweeper)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusOutcome {
    Completed {
        #[serde(default, rename = "receiptNumber", alias = "receiptId")]
        receipt_number: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Failed {
        reason: FailureReason,
        #[serde(default)]
        message: Option<String>,
    },
}

impl StatusOutcome {
    /// Status this outcome leads to
    pub fn status(&self) -> TransactionStatus {
        match self {
            Self::Completed { .. } => TransactionStatus::Completed,
            Self::Failed { .. } => TransactionStatus::Failed,
        }
    }
}

/// Out-of-band status notification, from a webhook or a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub correlation_ref: CorrelationRef,
    #[serde(flatten)]
    pub outcome: StatusOutcome,
}

impl StatusUpdate {
    pub fn new(correlation_ref: CorrelationRef, outcome: StatusOutcome) -> Self {
        Self {
            correlation_ref,
            outcome,
        }
    }
}

/// Durable record of a submitted payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub payer_id: PayerId,
    pub correlation_ref: CorrelationRef,
    pub destination: String,
    pub method: PaymentMethod,
    pub amount: Amount,
    pub description: String,
    pub sender_phone: Option<PhoneNumber>,
    /// Party credited: phone, till or business number
    pub recipient: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpesa_receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_reference: Option<String>,
}

impl Transaction {
    /// Pending record for an acknowledged submission
    pub fn pending(request: &PaymentRequest, correlation_ref: CorrelationRef) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            payer_id: request.payer_id.clone(),
            correlation_ref,
            destination: request.destination.clone(),
            method: request.method,
            amount: request.amount,
            description: request.description.clone(),
            sender_phone: request.sender.clone(),
            recipient: request.recipient.recipient().to_string(),
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
            mpesa_receipt_number: None,
            confirmation_message: None,
            failure_reason: None,
            client_reference: request.client_reference.clone(),
        }
    }

    /// Check if the transaction reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The record after applying a terminal outcome
    ///
    /// Returns `None` when the transaction is already terminal. All terminal
    /// fields are produced together in the returned copy.
    pub fn settled(&self, outcome: &StatusOutcome, at: DateTime<Utc>) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }

        let mut next = self.clone();
        next.status = outcome.status();
        next.updated_at = at;
        match outcome {
            StatusOutcome::Completed {
                receipt_number,
                message,
            } => {
                next.mpesa_receipt_number = receipt_number.clone();
                next.confirmation_message = message.clone();
            }
            StatusOutcome::Failed { reason, message } => {
                next.failure_reason = Some(reason.clone());
                next.confirmation_message = message.clone();
            }
        }
        Some(next)
    }
}
