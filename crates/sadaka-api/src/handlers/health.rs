//! Health Check Handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Gateway payments are submitted through
    pub gateway: String,
    pub timestamp: i64,
}

/// Returns 200 while the service is running
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gateway: state.service.gateway_name().to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}
