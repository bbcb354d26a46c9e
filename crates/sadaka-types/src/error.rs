//! Error types for Sadaka
//!
//! Every failure is explicit and classified, so callers can decide between
//! prompting the payer, retrying, or logging an anomaly.

use thiserror::Error;

/// Result type for Sadaka operations
pub type Result<T> = std::result::Result<T, SadakaError>;

/// Broad classes of failure, mirroring how each is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input. Recoverable locally, never sent to the gateway
    Validation,
    /// Sender-number management problems. Surfaced, no retry
    Profile,
    /// Gateway transport or provider failures
    Gateway,
    /// Status-tracking anomalies. Logged, never fatal to subscribers
    Ledger,
    /// Storage or unexpected internal faults
    Internal,
}

/// Sadaka error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SadakaError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Amount missing, non-numeric, non-positive or outside gateway limits
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Description empty or whitespace
    #[error("A payment description is required")]
    MissingDescription,

    /// Push-payment method chosen but the payer has no usable sender number
    #[error("Method {method} needs a verified M-Pesa number; add one first")]
    MissingSenderNumber { method: String },

    /// Phone number could not be normalized to a mobile number
    #[error("Invalid phone number format: {input}")]
    InvalidPhoneFormat { input: String },

    /// Same client reference submitted while the first attempt is in flight
    #[error("Payment {client_reference} is already being submitted")]
    DuplicateSubmission { client_reference: String },

    // ========================================================================
    // Catalog Errors
    // ========================================================================

    /// Destination not present in the catalog
    #[error("Payment destination {destination} not found")]
    DestinationNotFound { destination: String },

    /// Method not allowed for the destination
    #[error("Method {method} is not supported for {destination}")]
    UnsupportedMethod { destination: String, method: String },

    /// Method allowed but no recipient account configured
    #[error("No {method} account configured for {destination}")]
    AccountNotConfigured { destination: String, method: String },

    /// Catalog configuration failed validation
    #[error("Invalid catalog configuration: {reason}")]
    InvalidCatalog { reason: String },

    // ========================================================================
    // Profile Errors
    // ========================================================================

    /// Sender number unknown for this payer
    #[error("Sender number {sender_id} not found")]
    SenderNumberNotFound { sender_id: String },

    /// Operation requires a verified sender number
    #[error("Sender number {sender_id} has not been verified")]
    NotVerified { sender_id: String },

    /// Verification code mismatch or expired
    #[error("Invalid or expired verification code for {sender_id}")]
    InvalidCode { sender_id: String },

    /// Payer already registered this phone number
    #[error("Phone number {phone} is already registered")]
    DuplicateSenderNumber { phone: String },

    // ========================================================================
    // Gateway Errors
    // ========================================================================

    /// Transport failure, timeout or provider outage
    #[error("Payment failed to initiate: gateway unavailable ({reason})")]
    GatewayUnavailable { reason: String },

    /// Provider refused the request
    #[error("Payment rejected by gateway [{code}]: {message}")]
    GatewayRejected { code: String, message: String },

    // ========================================================================
    // Ledger Errors
    // ========================================================================

    /// No transaction matches the correlation reference
    #[error("No transaction matches correlation reference {correlation_ref}")]
    UnknownTransaction { correlation_ref: String },

    /// Transaction id unknown
    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Persistence collaborator failed
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SadakaError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an invalid amount error
    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            reason: reason.into(),
        }
    }

    /// Create a gateway-unavailable error
    pub fn gateway_unavailable(reason: impl Into<String>) -> Self {
        Self::GatewayUnavailable {
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. }
            | Self::MissingDescription
            | Self::MissingSenderNumber { .. }
            | Self::InvalidPhoneFormat { .. }
            | Self::DuplicateSubmission { .. }
            | Self::DestinationNotFound { .. }
            | Self::UnsupportedMethod { .. }
            | Self::AccountNotConfigured { .. } => ErrorKind::Validation,
            Self::SenderNumberNotFound { .. }
            | Self::NotVerified { .. }
            | Self::InvalidCode { .. }
            | Self::DuplicateSenderNumber { .. } => ErrorKind::Profile,
            Self::GatewayUnavailable { .. } | Self::GatewayRejected { .. } => ErrorKind::Gateway,
            Self::UnknownTransaction { .. } | Self::TransactionNotFound { .. } => ErrorKind::Ledger,
            Self::InvalidCatalog { .. } | Self::Storage { .. } | Self::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if the caller may retry automatically
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable { .. })
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::MissingDescription => "MISSING_DESCRIPTION",
            Self::MissingSenderNumber { .. } => "MISSING_SENDER_NUMBER",
            Self::InvalidPhoneFormat { .. } => "INVALID_PHONE_FORMAT",
            Self::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            Self::DestinationNotFound { .. } => "DESTINATION_NOT_FOUND",
            Self::UnsupportedMethod { .. } => "UNSUPPORTED_METHOD",
            Self::AccountNotConfigured { .. } => "ACCOUNT_NOT_CONFIGURED",
            Self::InvalidCatalog { .. } => "INVALID_CATALOG",
            Self::SenderNumberNotFound { .. } => "SENDER_NUMBER_NOT_FOUND",
            Self::NotVerified { .. } => "NOT_VERIFIED",
            Self::InvalidCode { .. } => "INVALID_CODE",
            Self::DuplicateSenderNumber { .. } => "DUPLICATE_SENDER_NUMBER",
            Self::GatewayUnavailable { .. } => "GATEWAY_UNAVAILABLE",
            Self::GatewayRejected { .. } => "GATEWAY_REJECTED",
            Self::UnknownTransaction { .. } => "UNKNOWN_TRANSACTION",
            Self::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SadakaError::MissingSenderNumber {
            method: "paybill".to_string(),
        };
        assert_eq!(err.error_code(), "MISSING_SENDER_NUMBER");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_only_transport_failures_are_retriable() {
        assert!(SadakaError::gateway_unavailable("timeout").is_retriable());

        let rejected = SadakaError::GatewayRejected {
            code: "400.002.02".to_string(),
            message: "Invalid PhoneNumber".to_string(),
        };
        assert!(!rejected.is_retriable());
        assert_eq!(rejected.kind(), ErrorKind::Gateway);
        assert!(!SadakaError::MissingDescription.is_retriable());
    }
}
