//! Sadaka Types - Canonical domain types for member-to-organization payments
//!
//! This crate contains all foundational types for Sadaka with zero dependencies
//! on other sadaka crates. It defines the type system for:
//!
//! - Identity types (PayerId, SenderNumberId, TransactionId, CorrelationRef)
//! - Whole-shilling amounts and canonical mobile numbers
//! - Payment destinations, methods and recipient account details
//! - Registered sender numbers
//! - Transactions and their asynchronous status updates
//!
//! # Payment Flow
//!
//! ```text
//! Destination → Method → Account → STK push → Pending → Completed | Failed
//! ```
//!
//! # Invariants
//!
//! 1. A transaction exists only once the gateway acknowledged its submission
//! 2. Status moves pending → completed or pending → failed, never back
//! 3. Only a verified sender number can be the payer's default

pub mod identity;
pub mod amount;
pub mod phone;
pub mod catalog;
pub mod sender;
pub mod transaction;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use phone::*;
pub use catalog::*;
pub use sender::*;
pub use transaction::*;
pub use error::*;

/// Version of the Sadaka types schema
pub const TYPES_VERSION: &str = "0.1.0";
