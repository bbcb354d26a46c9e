//! Sadaka Core - the mobile-money payment flow
//!
//! This crate implements the payment pipeline between presentation code and
//! the mobile-money provider:
//! - PaymentCatalog: destinations, allowed methods and recipient accounts
//! - PayerProfileStore: registered, verified sender numbers per payer
//! - PaymentRequestBuilder: ordered validation of payer input
//! - PaymentGateway: provider abstraction with bounded retry
//! - TransactionLedger: pending → completed | failed, applied exactly once
//! - StatusTracker / ConfirmationSweeper: asynchronous confirmation
//! - PaymentService: the facade presentation code talks to
//!
//! # Invariants
//!
//! 1. Validation failures never reach the gateway
//! 2. A transaction is recorded only after the gateway acknowledged it
//! 3. Terminal states never change; later updates are logged anomalies
//! 4. At most one verified default sender number per payer
//! 5. The same client reference is never submitted twice

pub mod catalog;
pub mod config;
pub mod store;
pub mod memory;
pub mod profile;
pub mod request;
pub mod gateway;
pub mod ledger;
pub mod tracker;
pub mod service;

pub use catalog::*;
pub use config::*;
pub use store::*;
pub use memory::*;
pub use profile::*;
pub use request::*;
pub use gateway::*;
pub use ledger::*;
pub use tracker::*;
pub use service::*;
