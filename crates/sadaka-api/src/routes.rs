//! API Routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Create API v1 routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Catalog
        .route("/destinations", get(handlers::catalog::list_destinations))
        .route("/destinations/:name/methods", get(handlers::catalog::list_methods))
        // Payer-scoped routes
        .nest("/payers/:payer", payer_routes())
        .route("/transactions/:id", get(handlers::payments::get_transaction))
        // Daraja webhook
        .route("/mpesa/callback", post(handlers::callback::mpesa_callback))
}

/// Payments and sender numbers of one payer
fn payer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", post(handlers::payments::submit_payment))
        .route("/transactions", get(handlers::payments::list_transactions))
        .route("/transactions/stream", get(handlers::payments::stream_transactions))
        .route(
            "/sender-numbers",
            get(handlers::senders::list_sender_numbers).post(handlers::senders::add_sender_number),
        )
        .route(
            "/sender-numbers/default",
            get(handlers::senders::get_default_sender_number),
        )
        .route(
            "/sender-numbers/:id",
            axum::routing::delete(handlers::senders::remove_sender_number),
        )
        .route(
            "/sender-numbers/:id/verify",
            post(handlers::senders::verify_sender_number),
        )
        .route(
            "/sender-numbers/:id/resend",
            post(handlers::senders::resend_verification_code),
        )
        .route(
            "/sender-numbers/:id/default",
            post(handlers::senders::set_default_sender_number),
        )
}
