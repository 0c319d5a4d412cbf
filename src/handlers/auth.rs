use super::AppState;
use crate::error::{missing_field, RelayResult};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SubmitCode {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// GET /auth/status
pub async fn auth_status(State(state): State<AppState>) -> Json<Value> {
    let pending = state.credentials.pending().await.map(|p| {
        json!({
            "url": p.url,
            "state": p.state,
            "created_at": p.created_at,
        })
    });

    Json(json!({
        "authorized": state.credentials.has_valid_credential(),
        "pending": pending,
    }))
}

/// POST /auth/code, completing a deferred manual authorization
pub async fn submit_code(
    State(state): State<AppState>,
    Json(body): Json<SubmitCode>,
) -> RelayResult<Json<Value>> {
    let code = body.code.ok_or_else(|| missing_field("code"))?;
    state
        .credentials
        .submit_code(body.state.as_deref(), &code)
        .await?;

    Ok(Json(json!({ "status": "Authorized" })))
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}
