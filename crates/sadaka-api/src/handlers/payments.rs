//! Payment Handlers
//!
//! Submission, transaction history and the live transaction feed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use sadaka_core::PaymentInput;
use sadaka_types::{PayerId, Transaction};
use std::sync::Arc;
use std::time::Duration;

use super::parse_transaction_id;
use crate::dto::TransactionListQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// SSE event name carrying a transaction snapshot
pub const TRANSACTIONS_EVENT: &str = "transactions";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// `POST /payers/:payer/payments`
///
/// Answers 202 with the pending transaction once the gateway has accepted
/// the push. The submission runs on its own task, so a client that hangs up
/// does not abort a request already sent to the gateway.
pub async fn submit_payment(
    State(state): State<Arc<AppState>>,
    Path(payer): Path<String>,
    Json(input): Json<PaymentInput>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let transaction = state
        .service
        .spawn_submit_payment(PayerId::new(payer), input)
        .await
        .map_err(|e| ApiError::Internal(format!("submission task failed: {e}")))??;

    Ok((StatusCode::ACCEPTED, Json(transaction)))
}

/// `GET /payers/:payer/transactions?limit=`
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(payer): Path<String>,
    Query(query): Query<TransactionListQuery>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let transactions = state
        .service
        .list_transactions(&PayerId::new(payer), query.limit)
        .await?;
    Ok(Json(transactions))
}

/// `GET /transactions/:id`
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Transaction>> {
    let id = parse_transaction_id(&id)?;
    Ok(Json(state.service.get_transaction(&id).await?))
}

/// `GET /payers/:payer/transactions/stream`
///
/// Server-sent events, one `transactions` event per snapshot, newest first.
pub async fn stream_transactions(
    State(state): State<Arc<AppState>>,
    Path(payer): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let snapshots = state
        .service
        .subscribe_transactions(PayerId::new(payer))
        .map(|snapshot| Event::default().event(TRANSACTIONS_EVENT).json_data(snapshot));

    Sse::new(snapshots).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
