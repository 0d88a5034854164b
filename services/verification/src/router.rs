use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use verimail_core::health::healthz;
use verimail_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    health::readyz,
    outbox::list_outbox,
    verify::{request_verification, verify_email},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Verification
        .route("/v1/user/verify", get(verify_email))
        .route("/v1/user/verification", post(request_verification))
        // Operator view
        .route("/v1/outbox", get(list_outbox))
        .with_state(state)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
}
