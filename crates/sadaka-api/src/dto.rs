//! Request and response bodies
//!
//! Domain types already serialize in camelCase, so most endpoints return
//! them directly. These cover the shapes that have no domain counterpart.

use sadaka_types::{MethodInfo, PaymentDestination, SenderNumber};
use serde::{Deserialize, Serialize};

/// Body of `POST /payers/:payer/sender-numbers`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSenderNumberRequest {
    pub phone_number: String,
}

/// Body of `POST /payers/:payer/sender-numbers/:id/verify`
#[derive(Debug, Clone, Deserialize)]
pub struct VerifySenderNumberRequest {
    pub code: String,
}

/// Query of `GET /payers/:payer/transactions`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationListResponse {
    pub destinations: Vec<PaymentDestination>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodListResponse {
    pub destination: String,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderNumberListResponse {
    pub sender_numbers: Vec<SenderNumber>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultSenderNumberResponse {
    pub sender_number: Option<SenderNumber>,
}
