//! Tenant scope checks for the management routes.
//!
//! Callers that do not own an application get a `ScopeViolation` that renders
//! exactly like the `NotFound` for an id that does not exist.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Application, License};

/// Load an application and confirm `owner_id` owns it.
pub fn require_owned_app(conn: &Connection, owner_id: &str, app_id: &str) -> Result<Application> {
    let app = queries::get_application_by_id(conn, app_id)?
        .ok_or_else(|| AppError::NotFound("Application not found".into()))?;

    if app.owner_id != owner_id {
        tracing::debug!(app_id, "application requested by non-owner");
        return Err(AppError::ScopeViolation("Application not found".into()));
    }

    Ok(app)
}

/// Load a license and confirm it was issued under `app`.
pub fn require_license_in_app(
    conn: &Connection,
    app: &Application,
    license_id: &str,
) -> Result<License> {
    let license = queries::get_license_by_id(conn, license_id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    if license.app_id != app.id || license.owner_id != app.owner_id {
        return Err(AppError::ScopeViolation("License not found".into()));
    }

    Ok(license)
}
