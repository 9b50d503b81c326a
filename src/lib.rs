pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod scope;
pub mod util;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::db::AppState;

/// Full HTTP surface: public validation plus tenant license management.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public::router())
        .merge(handlers::apps::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
