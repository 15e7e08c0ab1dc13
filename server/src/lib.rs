//! tabsync server - keeps a Google Sheets range and a Postgres table
//! convergent.
//!
//! The server runs the reconciliation loop on a timer and exposes a small
//! HTTP API for editing the Postgres side directly and for inspecting the
//! last sync cycle.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod sync;

use crate::db::Pool;
use crate::sync::CycleRunner;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub runner: Arc<CycleRunner>,
    /// Bearer token required by the API, if any
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pool: Pool, runner: Arc<CycleRunner>, api_token: Option<String>) -> Self {
        Self {
            pool,
            runner,
            api_token: api_token.map(Arc::from),
        }
    }
}

/// Build the HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
