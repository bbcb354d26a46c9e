//! Request handlers

pub mod callback;
pub mod catalog;
pub mod health;
pub mod payments;
pub mod senders;

use crate::error::ApiError;
use sadaka_types::{SenderNumberId, TransactionId};

pub(crate) fn parse_sender_id(raw: &str) -> Result<SenderNumberId, ApiError> {
    SenderNumberId::parse(raw)
        .map_err(|_| ApiError::InvalidParameter(format!("sender number id {raw:?}")))
}

pub(crate) fn parse_transaction_id(raw: &str) -> Result<TransactionId, ApiError> {
    TransactionId::parse(raw)
        .map_err(|_| ApiError::InvalidParameter(format!("transaction id {raw:?}")))
}
