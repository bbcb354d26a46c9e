//! Sender Number Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sadaka_types::{PayerId, SenderNumber};
use std::sync::Arc;

use super::parse_sender_id;
use crate::dto::{
    AddSenderNumberRequest, DefaultSenderNumberResponse, SenderNumberListResponse,
    VerifySenderNumberRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /payers/:payer/sender-numbers`
pub async fn list_sender_numbers(
    State(state): State<Arc<AppState>>,
    Path(payer): Path<String>,
) -> ApiResult<Json<SenderNumberListResponse>> {
    let sender_numbers = state.service.list_sender_numbers(&PayerId::new(payer)).await?;
    Ok(Json(SenderNumberListResponse { sender_numbers }))
}

/// `POST /payers/:payer/sender-numbers`
///
/// Registers the number unverified and sends it a code.
pub async fn add_sender_number(
    State(state): State<Arc<AppState>>,
    Path(payer): Path<String>,
    Json(body): Json<AddSenderNumberRequest>,
) -> ApiResult<(StatusCode, Json<SenderNumber>)> {
    let number = state
        .service
        .add_sender_number(&PayerId::new(payer), &body.phone_number)
        .await?;
    Ok((StatusCode::CREATED, Json(number)))
}

/// `GET /payers/:payer/sender-numbers/default`
pub async fn get_default_sender_number(
    State(state): State<Arc<AppState>>,
    Path(payer): Path<String>,
) -> ApiResult<Json<DefaultSenderNumberResponse>> {
    let sender_number = state
        .service
        .get_default_sender_number(&PayerId::new(payer))
        .await?;
    Ok(Json(DefaultSenderNumberResponse { sender_number }))
}

/// `POST /payers/:payer/sender-numbers/:id/verify`
pub async fn verify_sender_number(
    State(state): State<Arc<AppState>>,
    Path((payer, id)): Path<(String, String)>,
    Json(body): Json<VerifySenderNumberRequest>,
) -> ApiResult<Json<SenderNumber>> {
    let id = parse_sender_id(&id)?;
    let number = state
        .service
        .verify_sender_number(&PayerId::new(payer), id, body.code.trim())
        .await?;
    Ok(Json(number))
}

/// `POST /payers/:payer/sender-numbers/:id/resend`
pub async fn resend_verification_code(
    State(state): State<Arc<AppState>>,
    Path((payer, id)): Path<(String, String)>,
) -> ApiResult<Json<SenderNumber>> {
    let id = parse_sender_id(&id)?;
    let number = state
        .service
        .resend_verification_code(&PayerId::new(payer), id)
        .await?;
    Ok(Json(number))
}

/// `POST /payers/:payer/sender-numbers/:id/default`
pub async fn set_default_sender_number(
    State(state): State<Arc<AppState>>,
    Path((payer, id)): Path<(String, String)>,
) -> ApiResult<Json<SenderNumber>> {
    let id = parse_sender_id(&id)?;
    let number = state
        .service
        .set_default_sender_number(&PayerId::new(payer), id)
        .await?;
    Ok(Json(number))
}

/// `DELETE /payers/:payer/sender-numbers/:id`
pub async fn remove_sender_number(
    State(state): State<Arc<AppState>>,
    Path((payer, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let id = parse_sender_id(&id)?;
    state
        .service
        .remove_sender_number(&PayerId::new(payer), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
