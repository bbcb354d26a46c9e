//! Registered sender numbers
//!
//! A payer may register several M-Pesa numbers. Each must be verified by a
//! one-time code before it can fund a push payment or become the default.

use crate::{PayerId, PhoneNumber, SenderNumberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mobile-money number registered by a payer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderNumber {
    pub id: SenderNumberId,
    pub payer_id: PayerId,
    pub phone_number: PhoneNumber,
    pub is_verified: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl SenderNumber {
    /// A freshly added, unverified number
    pub fn new(payer_id: PayerId, phone_number: PhoneNumber, is_default: bool) -> Self {
        Self {
            id: SenderNumberId::new(),
            payer_id,
            phone_number,
            is_verified: false,
            is_default,
            created_at: Utc::now(),
            verified_at: None,
        }
    }

    /// Default that can actually fund a payment
    pub fn is_usable_default(&self) -> bool {
        self.is_default && self.is_verified
    }
}
