//! Whole-shilling amounts
//!
//! M-Pesa only moves integral Kenyan shillings, so amounts are stored as a
//! plain `u64` of KES. User input arrives either as a JSON number or as free
//! text from a form field; both are funneled through [`AmountInput::parse`].

use crate::{Result, SadakaError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217 code of the only currency the gateway settles
pub const CURRENCY_CODE: &str = "KES";

/// Amount in whole Kenyan shillings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Create an amount from whole shillings
    pub const fn from_shillings(value: u64) -> Self {
        Self(value)
    }

    /// Get the value in shillings
    pub fn shillings(&self) -> u64 {
        self.0
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a user-entered amount such as `"1,500"` or `"200.00"`
    pub fn parse(input: &str) -> Result<Self> {
        let cleaned: String = input
            .trim()
            .trim_start_matches('+')
            .chars()
            .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
            .collect();

        if cleaned.is_empty() {
            return Err(SadakaError::invalid_amount("amount is required"));
        }
        if cleaned.starts_with('-') {
            return Err(SadakaError::invalid_amount("amount must be greater than zero"));
        }

        let (whole, fraction) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
        let numeric = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !numeric(whole) || !numeric(fraction) {
            return Err(SadakaError::invalid_amount(format!("{input:?} is not a number")));
        }
        if fraction.chars().any(|c| c != '0') {
            return Err(SadakaError::invalid_amount("amount must be in whole shillings"));
        }

        let value = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .map_err(|_| SadakaError::invalid_amount("amount is too large"))?
        };
        if value == 0 {
            return Err(SadakaError::invalid_amount("amount must be greater than zero"));
        }

        Ok(Self(value))
    }

    /// Convert a JSON number into an amount
    pub fn from_number(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(SadakaError::invalid_amount("amount is not a number"));
        }
        if value <= 0.0 {
            return Err(SadakaError::invalid_amount("amount must be greater than zero"));
        }
        if value.fract() != 0.0 {
            return Err(SadakaError::invalid_amount("amount must be in whole shillings"));
        }
        if value >= u64::MAX as f64 {
            return Err(SadakaError::invalid_amount("amount is too large"));
        }
        Ok(Self(value as u64))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", CURRENCY_CODE, self.0)
    }
}

/// Raw amount as submitted by presentation code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    /// Validate into a positive whole-shilling amount
    pub fn parse(&self) -> Result<Amount> {
        match self {
            Self::Number(value) => Amount::from_number(*value),
            Self::Text(text) => Amount::parse(text),
        }
    }
}

impl From<u64> for AmountInput {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for AmountInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
