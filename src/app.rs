use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    auth::{auth_status, health, submit_code},
    events::{create_event, delete_event, list_events, update_event},
    AppState,
};

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/events", post(list_events))
        .route("/events/create", post(create_event))
        .route("/events/update", post(update_event))
        .route("/events/delete", post(delete_event))
        .route("/auth/status", get(auth_status))
        .route("/auth/code", post(submit_code))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
