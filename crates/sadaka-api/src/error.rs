//! API error handling
//!
//! Domain errors keep their stable codes; the HTTP status follows the error
//! taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sadaka_types::{ErrorKind, SadakaError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error
#[derive(Debug, Error)]
pub enum ApiError {
    /// Anything the payment core reported
    #[error(transparent)]
    Domain(#[from] SadakaError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Domain(err) => err.error_code(),
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::InvalidRequestBody(_) => "INVALID_REQUEST_BODY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Domain(err) => domain_status(err),
            Self::InvalidParameter(_) | Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn domain_status(err: &SadakaError) -> StatusCode {
    match err {
        // 404 Not Found
        SadakaError::DestinationNotFound { .. }
        | SadakaError::SenderNumberNotFound { .. }
        | SadakaError::TransactionNotFound { .. }
        | SadakaError::UnknownTransaction { .. } => StatusCode::NOT_FOUND,

        // 409 Conflict
        SadakaError::DuplicateSubmission { .. } | SadakaError::DuplicateSenderNumber { .. } => {
            StatusCode::CONFLICT
        }

        // 422 Unprocessable Entity
        SadakaError::MissingSenderNumber { .. } | SadakaError::NotVerified { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }

        // 502 / 503
        SadakaError::GatewayRejected { .. } => StatusCode::BAD_GATEWAY,
        SadakaError::GatewayUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

        other => match other.kind() {
            ErrorKind::Validation | ErrorKind::Profile => StatusCode::BAD_REQUEST,
            ErrorKind::Gateway => StatusCode::BAD_GATEWAY,
            ErrorKind::Ledger => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub msg: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.error_code().to_string(),
            msg: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
