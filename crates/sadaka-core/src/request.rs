//! Payment Request Builder
//!
//! Turns raw presentation input into a validated [`PaymentRequest`]. Checks
//! run in a fixed order so the payer always sees the first problem with their
//! form: amount, description, destination, sender number, then account.

use crate::catalog::PaymentCatalog;
use crate::config::PaymentConfig;
use sadaka_types::{
    Amount, AmountInput, PayerId, PaymentMethod, PaymentRequest, Result, SadakaError,
    SenderNumber, SenderNumberId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the payer filled in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub destination: String,
    /// Chosen method; the destination's default when absent
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub amount: Option<AmountInput>,
    #[serde(default)]
    pub description: String,
    /// Explicit sender number; the payer's default when absent
    #[serde(default)]
    pub sender_number_id: Option<SenderNumberId>,
    /// Idempotency key chosen by the client
    #[serde(default)]
    pub client_reference: Option<String>,
}

impl PaymentInput {
    pub fn new(destination: impl Into<String>, amount: impl Into<AmountInput>, description: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            amount: Some(amount.into()),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_client_reference(mut self, reference: impl Into<String>) -> Self {
        self.client_reference = Some(reference.into());
        self
    }
}

/// Form fields that passed the payer-independent checks
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedForm {
    pub amount: Amount,
    pub description: String,
    pub destination: String,
    pub method: PaymentMethod,
}

/// Validates input against the catalog and gateway limits
#[derive(Debug, Clone)]
pub struct PaymentRequestBuilder {
    catalog: Arc<PaymentCatalog>,
    min_amount: Amount,
    max_amount: Amount,
}

impl PaymentRequestBuilder {
    pub fn new(catalog: Arc<PaymentCatalog>, config: &PaymentConfig) -> Self {
        Self {
            catalog,
            min_amount: config.min_amount(),
            max_amount: config.max_amount(),
        }
    }

    /// Check the parts of the form that do not depend on the payer
    ///
    /// Runs the amount, description and destination checks in order and
    /// settles the method. Callers look up sender numbers only after this
    /// passes, so a bad amount is reported as such whatever sender was picked.
    pub fn check_form(&self, input: &PaymentInput) -> Result<CheckedForm> {
        let amount = self.validate_amount(input.amount.as_ref())?;

        let description = input.description.trim();
        if description.is_empty() {
            return Err(SadakaError::MissingDescription);
        }

        let destination = self.catalog.destination(&input.destination)?;
        let method = input.method.unwrap_or(destination.default_method);

        Ok(CheckedForm {
            amount,
            description: description.to_string(),
            destination: destination.name.clone(),
            method,
        })
    }

    /// Validate and assemble a request
    ///
    /// `sender` is the number already resolved for the payer, if any.
    pub fn build(
        &self,
        payer_id: &PayerId,
        input: &PaymentInput,
        sender: Option<&SenderNumber>,
    ) -> Result<PaymentRequest> {
        let form = self.check_form(input)?;
        self.complete(payer_id, input, form, sender)
    }

    /// Finish a checked form with the payer's sender number and the recipient account
    pub fn complete(
        &self,
        payer_id: &PayerId,
        input: &PaymentInput,
        form: CheckedForm,
        sender: Option<&SenderNumber>,
    ) -> Result<PaymentRequest> {
        let method = form.method;
        let sender = if method.requires_sender_number() {
            let number = sender.ok_or_else(|| SadakaError::MissingSenderNumber {
                method: method.to_string(),
            })?;
            if number.payer_id != *payer_id {
                return Err(SadakaError::SenderNumberNotFound {
                    sender_id: number.id.to_string(),
                });
            }
            if !number.is_verified {
                return Err(SadakaError::NotVerified {
                    sender_id: number.id.to_string(),
                });
            }
            Some(number.phone_number.clone())
        } else {
            None
        };

        let recipient = self.catalog.resolve_account(&form.destination, method)?.clone();

        Ok(PaymentRequest {
            payer_id: payer_id.clone(),
            destination: form.destination,
            method,
            amount: form.amount,
            description: form.description,
            sender,
            recipient,
            client_reference: input.client_reference.clone(),
        })
    }

    fn validate_amount(&self, input: Option<&AmountInput>) -> Result<Amount> {
        let amount = input
            .ok_or_else(|| SadakaError::invalid_amount("amount is required"))?
            .parse()?;

        if amount < self.min_amount {
            return Err(SadakaError::invalid_amount(format!(
                "minimum amount is {}",
                self.min_amount
            )));
        }
        if amount > self.max_amount {
            return Err(SadakaError::invalid_amount(format!(
                "maximum amount is {}",
                self.max_amount
            )));
        }
        Ok(amount)
    }
}
