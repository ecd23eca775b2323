//! Status HTTP surface, grounded on `voice-agent-server`'s
//! `http::create_router`: an Axum router with CORS/trace layers exposing
//! liveness and a JSON status snapshot, with no admin UI (out of scope).

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::orchestrator::Orchestrator;

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn status(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orchestrator.status())
}
