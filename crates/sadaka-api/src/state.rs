//! Application state shared across handlers

use sadaka_core::PaymentService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment core facade
    pub service: Arc<PaymentService>,
}

impl AppState {
    pub fn new(service: Arc<PaymentService>) -> Self {
        Self { service }
    }
}
