mod licenses;

pub use licenses::*;

use axum::{
    Router, middleware,
    routing::{delete, get, put},
};

use crate::db::AppState;
use crate::middleware::tenant_app_auth;

/// Tenant-facing license management. Every route is scoped to an
/// application the bearer key's tenant owns.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/apps/{app_id}/licenses",
            get(list_licenses).post(create_license),
        )
        .route(
            "/apps/{app_id}/licenses/{license_id}",
            get(get_license).delete(delete_license),
        )
        .route(
            "/apps/{app_id}/licenses/{license_id}/status",
            put(update_license_status),
        )
        .route(
            "/apps/{app_id}/licenses/{license_id}/devices/{hwid}",
            delete(unbind_device),
        )
        .route(
            "/apps/{app_id}/licenses/{license_id}/logs",
            get(list_license_logs),
        )
        .layer(middleware::from_fn_with_state(state, tenant_app_auth))
}
