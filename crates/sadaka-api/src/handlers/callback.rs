//! Daraja Callback Handler

use axum::{body::Bytes, extract::State, Json};
use sadaka_mpesa::{CallbackAck, CallbackEnvelope};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /mpesa/callback`
///
/// Queues the result for the status tracker and acknowledges at once.
/// Unknown or repeated references are the tracker's concern, not Daraja's.
pub async fn mpesa_callback(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<CallbackAck>> {
    let update = CallbackEnvelope::parse(&body)
        .and_then(CallbackEnvelope::into_status_update)
        .map_err(|e| {
            warn!(error = %e, "Rejected malformed Daraja callback");
            ApiError::InvalidRequestBody(e.to_string())
        })?;

    info!(
        correlation_ref = %update.correlation_ref,
        status = %update.outcome.status(),
        "Daraja callback received"
    );

    state
        .service
        .status_updates()
        .send(update)
        .await
        .map_err(|_| ApiError::Internal("status tracker is not running".to_string()))?;

    Ok(Json(CallbackAck::accepted()))
}
