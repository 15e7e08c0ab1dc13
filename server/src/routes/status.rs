//! Sync status endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::auth::Authorized;
use crate::AppState;

/// Create status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync/status", get(status_handler))
}

/// GET /sync/status - Summary of the last cycle; 204 before the first one.
async fn status_handler(State(state): State<AppState>, _auth: Authorized) -> Response {
    match state.runner.last_summary().await {
        Some(summary) => Json(summary).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
