//! Event endpoints. Each one obtains a credential, runs one provider
//! operation and wraps the provider's answer.

use super::AppState;
use crate::components::google_calendar::time::now_in_zone;
use crate::components::google_calendar::{CalendarOperation, ListEventsQuery};
use crate::error::RelayResult;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

/// POST /events
pub async fn list_events(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> RelayResult<Json<Value>> {
    let query = ListEventsQuery::from_body(&body, now_in_zone(state.timezone), state.max_results);
    debug!("Listing events from {}", query.time_min);

    let response = invoke(&state, CalendarOperation::List(query)).await?;
    let items = response
        .get("items")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    Ok(Json(json!({ "items": items })))
}

/// POST /events/create
pub async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> RelayResult<Json<Value>> {
    let event = invoke(&state, CalendarOperation::Insert { event: body }).await?;
    Ok(Json(json!({ "event": event })))
}

/// POST /events/update
pub async fn update_event(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> RelayResult<Json<Value>> {
    let operation = CalendarOperation::update_from_body(body)?;
    let event = invoke(&state, operation).await?;
    Ok(Json(json!({ "event": event })))
}

/// POST /events/delete
pub async fn delete_event(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> RelayResult<Json<Value>> {
    let operation = CalendarOperation::delete_from_body(&body)?;
    invoke(&state, operation).await?;
    Ok(Json(json!({ "status": "Event deleted" })))
}

async fn invoke(state: &AppState, operation: CalendarOperation) -> RelayResult<Value> {
    let credential = state.credentials.obtain().await?;
    state.provider.invoke(&credential, operation).await
}
