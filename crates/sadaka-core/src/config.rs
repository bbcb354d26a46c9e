//! Payment flow configuration
//!
//! Gateway limits, the confirmation window and verification-code lifetime.
//! None of these are known from the provider up front, so every one of them
//! is a tunable with a conservative default.

use crate::gateway::RetryPolicy;
use sadaka_types::Amount;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest amount M-Pesa accepts for a push payment
pub const DEFAULT_MIN_AMOUNT: u64 = 10;

/// Largest single push payment allowed by the provider
pub const DEFAULT_MAX_AMOUNT: u64 = 250_000;

/// Tunables for the payment core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Minimum accepted amount in shillings
    pub min_amount: u64,
    /// Maximum accepted amount in shillings
    pub max_amount: u64,
    /// How long a transaction may stay pending before it is failed
    #[serde(with = "humantime_serde")]
    pub confirmation_timeout: Duration,
    /// Age after which a pending transaction is polled at the gateway
    #[serde(with = "humantime_serde")]
    pub poll_after: Duration,
    /// Interval between confirmation sweeps
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Lifetime of a dispatched verification code
    #[serde(with = "humantime_serde")]
    pub verification_code_ttl: Duration,
    /// Automatic retry on transient gateway failures
    pub retry: RetryPolicy,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            min_amount: DEFAULT_MIN_AMOUNT,
            max_amount: DEFAULT_MAX_AMOUNT,
            confirmation_timeout: Duration::from_secs(120),
            poll_after: Duration::from_secs(30),
            poll_interval: Duration::from_secs(15),
            verification_code_ttl: Duration::from_secs(10 * 60), // 10 minutes
            retry: RetryPolicy::default(),
        }
    }
}

impl PaymentConfig {
    pub fn min_amount(&self) -> Amount {
        Amount::from_shillings(self.min_amount)
    }

    pub fn max_amount(&self) -> Amount {
        Amount::from_shillings(self.max_amount)
    }
}
