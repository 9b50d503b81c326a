mod validate;

pub use validate::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Routes called by licensed client software. CORS is open because clients
/// validate from arbitrary origins.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/validate", post(validate_license))
        .layer(CorsLayer::permissive())
}
