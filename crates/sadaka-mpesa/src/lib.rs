//! # Sadaka M-Pesa
//!
//! Safaricom Daraja integration: OAuth token handling, STK push submission,
//! the status query used by the confirmation sweeper, and parsing of the
//! result callbacks Daraja posts back. A simulated gateway with the same
//! contract covers local development.

pub mod auth;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod simulated;
pub mod stk;

pub use callback::{CallbackAck, CallbackEnvelope};
pub use client::MpesaGateway;
pub use config::{MpesaConfig, MpesaEnvironment};
pub use error::{MpesaError, MpesaResult};
pub use simulated::{SimulatedConfig, SimulatedGateway};
