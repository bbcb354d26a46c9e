//! Daraja client errors

use sadaka_types::SadakaError;
use thiserror::Error;

/// Result type for Daraja operations
pub type MpesaResult<T> = std::result::Result<T, MpesaError>;

/// Errors talking to the Daraja API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpesaError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request to Daraja timed out")]
    Timeout,

    #[error("Daraja rejected the access token")]
    Unauthorized,

    #[error("Daraja returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Provider refused the request (`errorCode` or non-zero `ResponseCode`)
    #[error("Daraja rejected the request [{code}]: {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid response from Daraja: {message}")]
    InvalidResponse { message: String },

    #[error("Payment method {method} cannot be paid by STK push")]
    UnsupportedMethod { method: String },

    #[error("Invalid callback: {message}")]
    InvalidCallback { message: String },
}

impl MpesaError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<MpesaError> for SadakaError {
    fn from(err: MpesaError) -> Self {
        match err {
            MpesaError::Network { .. } | MpesaError::Timeout | MpesaError::Unauthorized => {
                SadakaError::gateway_unavailable(err.to_string())
            }
            MpesaError::Http { status, .. } if status >= 500 => {
                SadakaError::gateway_unavailable(err.to_string())
            }
            MpesaError::Http { status, body } => SadakaError::GatewayRejected {
                code: status.to_string(),
                message: body,
            },
            MpesaError::Rejected { code, message } => SadakaError::GatewayRejected { code, message },
            // The request may have been accepted; resubmitting could charge twice
            MpesaError::InvalidResponse { message } => SadakaError::GatewayRejected {
                code: "INVALID_RESPONSE".to_string(),
                message,
            },
            MpesaError::UnsupportedMethod { method } => SadakaError::GatewayRejected {
                code: "UNSUPPORTED_METHOD".to_string(),
                message: format!("{method} cannot be paid by STK push"),
            },
            MpesaError::Configuration { message } | MpesaError::InvalidCallback { message } => {
                SadakaError::internal(message)
            }
        }
    }
}
