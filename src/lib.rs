pub mod config;
pub mod db;
pub mod error;
pub mod rooms;

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};

use rooms::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

/// Routes: the room socket at `/ws` and a liveness check at `/api/health`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(rooms::router())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
