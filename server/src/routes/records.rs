//! Record CRUD routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tabsync_engine::{Record, RecordId};

use crate::auth::Authorized;
use crate::error::Result;
use crate::handlers::{self, MessageResponse, NewRecord, RecordPatch};
use crate::AppState;

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_handler).post(create_handler))
        .route(
            "/records/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
}

/// GET /records - All records, ordered by id.
async fn list_handler(
    State(state): State<AppState>,
    _auth: Authorized,
) -> Result<Json<Vec<Record>>> {
    Ok(Json(handlers::list_records(&state.pool).await?))
}

/// GET /records/{id}
async fn get_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<RecordId>,
) -> Result<Json<Record>> {
    Ok(Json(handlers::get_record(&state.pool, id).await?))
}

/// POST /records - Create a record.
async fn create_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    Json(new): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>)> {
    let record = handlers::create_record(&state.pool, new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /records/{id} - Partially update a record.
async fn update_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<RecordId>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<Record>> {
    Ok(Json(handlers::update_record(&state.pool, id, patch).await?))
}

/// DELETE /records/{id}
async fn delete_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<RecordId>,
) -> Result<Json<MessageResponse>> {
    Ok(Json(handlers::delete_record(&state.pool, id).await?))
}
