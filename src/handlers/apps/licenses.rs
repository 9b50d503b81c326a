use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path, Query};
use crate::licensing;
use crate::middleware::TenantContext;
use crate::models::{
    AuditLogEntry, AuditLogQuery, CreateLicense, CreatedLicense, License, LicensePage,
    LicenseWithApp, PageQuery, UpdateLicenseStatus,
};
use crate::scope;

#[derive(Deserialize)]
pub struct LicensePath {
    pub app_id: String,
    pub license_id: String,
}

#[derive(Deserialize)]
pub struct LicenseDevicePath {
    pub app_id: String,
    pub license_id: String,
    pub hwid: String,
}

#[derive(Serialize)]
pub struct AuditLogResponse {
    pub logs: Vec<AuditLogEntry>,
}

/// GET /apps/{app_id}/licenses
pub async fn list_licenses(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<LicensePage>> {
    let conn = state.db.get()?;
    let page = licensing::list_licenses(&conn, &ctx.app.id, &page)?;
    Ok(Json(page))
}

/// POST /apps/{app_id}/licenses
pub async fn create_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<CreateLicense>,
) -> Result<(StatusCode, Json<CreatedLicense>)> {
    let conn = state.db.get()?;
    let created = licensing::create_license(
        &conn,
        &state.license_key_prefix,
        ctx.owner_id(),
        &ctx.app.id,
        &body,
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /apps/{app_id}/licenses/{license_id}
pub async fn get_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<LicensePath>,
) -> Result<Json<LicenseWithApp>> {
    let conn = state.db.get()?;
    scope::require_license_in_app(&conn, &ctx.app, &path.license_id)?;
    let license = licensing::get_license(&conn, &path.license_id)?;
    Ok(Json(license))
}

/// DELETE /apps/{app_id}/licenses/{license_id}
pub async fn delete_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<LicensePath>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    scope::require_license_in_app(&conn, &ctx.app, &path.license_id)?;
    licensing::delete_license(&conn, &path.license_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// PUT /apps/{app_id}/licenses/{license_id}/status
pub async fn update_license_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<LicensePath>,
    Json(body): Json<UpdateLicenseStatus>,
) -> Result<Json<License>> {
    let conn = state.db.get()?;
    scope::require_license_in_app(&conn, &ctx.app, &path.license_id)?;
    let license = licensing::set_license_status(&conn, &path.license_id, body.status)?;
    Ok(Json(license))
}

/// DELETE /apps/{app_id}/licenses/{license_id}/devices/{hwid}
/// Free a device slot (e.g. a lost or replaced machine)
pub async fn unbind_device(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<LicenseDevicePath>,
) -> Result<Json<License>> {
    let conn = state.db.get()?;
    scope::require_license_in_app(&conn, &ctx.app, &path.license_id)?;
    let license = licensing::unbind_device(&conn, &path.license_id, &path.hwid)?;
    Ok(Json(license))
}

/// GET /apps/{app_id}/licenses/{license_id}/logs
pub async fn list_license_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(path): Path<LicensePath>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogResponse>> {
    {
        let conn = state.db.get()?;
        scope::require_license_in_app(&conn, &ctx.app, &path.license_id)?;
    }
    let audit_conn = state.audit.get()?;
    let logs = licensing::list_audit_log(&audit_conn, &path.license_id, &query)?;
    Ok(Json(AuditLogResponse { logs }))
}
