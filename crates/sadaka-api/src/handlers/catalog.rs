//! Catalog Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::dto::{DestinationListResponse, MethodListResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /destinations`
pub async fn list_destinations(State(state): State<Arc<AppState>>) -> Json<DestinationListResponse> {
    Json(DestinationListResponse {
        destinations: state.service.list_destinations().to_vec(),
    })
}

/// `GET /destinations/:name/methods`
///
/// The destination's default method comes first.
pub async fn list_methods(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<MethodListResponse>> {
    let methods = state.service.list_methods(&name)?;
    Ok(Json(MethodListResponse {
        destination: name,
        methods,
    }))
}
