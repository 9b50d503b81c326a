use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::{ApiKey, Application};
use crate::scope;
use crate::util::extract_bearer_token;

/// Authenticated tenant, plus the application the route is scoped to.
#[derive(Clone)]
pub struct TenantContext {
    pub api_key: ApiKey,
    pub app: Application,
}

impl TenantContext {
    pub fn owner_id(&self) -> &str {
        &self.api_key.owner_id
    }
}

/// Authenticate the bearer API key and confirm the tenant owns `{app_id}`.
///
/// Applications owned by someone else are reported exactly like missing ones.
pub async fn tenant_app_auth(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let app_id = params
        .get("app_id")
        .ok_or_else(|| AppError::BadRequest("Missing application id".into()))?;

    let api_key = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    // Release the connection before running the handler
    let ctx = {
        let conn = state.db.get()?;

        let api_key = queries::get_api_key_by_secret(&conn, api_key)?
            .ok_or(AppError::Unauthorized)?;

        let app = scope::require_owned_app(&conn, &api_key.owner_id, app_id)?;

        TenantContext { api_key, app }
    };

    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}
