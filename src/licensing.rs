//! License lifecycle: validation, issuing, deletion, listing and status changes.
//!
//! Validation order is fixed: key lookup, then expiry, then status, then
//! device binding. Expiry is always computed from `expires_at` at call time,
//! so an expired license reports `Expired` whatever its stored status is.

use rusqlite::Connection;

use crate::audit;
use crate::db::queries::{self, DeviceBinding};
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::models::*;

/// Shown when a license's application no longer exists.
pub const UNKNOWN_APP_NAME: &str = "Unknown Application";

const DEFAULT_HWID_LIMIT: i32 = 1;

/// A validation attempt as received at the boundary.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub key: String,
    pub hwid: Option<String>,
    pub ip: String,
}

/// Ids of the license a validation resolved to, kept for the audit entry
/// even when validation is denied.
#[derive(Debug, Default)]
struct Resolved {
    license_id: Option<String>,
    app_id: Option<String>,
}

fn normalize_hwid(hwid: Option<&str>) -> Option<&str> {
    hwid.map(str::trim).filter(|h| !h.is_empty())
}

/// Validate a key and, if `hwid` is given, bind it to the license.
pub fn validate_license(
    conn: &mut Connection,
    key: &str,
    hwid: Option<&str>,
) -> Result<LicenseView> {
    validate_resolving(conn, key, normalize_hwid(hwid), &mut Resolved::default())
}

/// `hwid` must already be normalized.
fn validate_resolving(
    conn: &mut Connection,
    key: &str,
    hwid: Option<&str>,
    resolved: &mut Resolved,
) -> Result<LicenseView> {
    let license = queries::get_license_by_key(conn, key)?
        .ok_or_else(|| AppError::NotFound("Invalid license key".into()))?;

    resolved.license_id = Some(license.id.clone());
    resolved.app_id = Some(license.app_id.clone());

    if license.is_expired_at(queries::now()) {
        return Err(AppError::Expired);
    }

    if license.status != LicenseStatus::Active {
        return Err(AppError::NotActive);
    }

    // hwid_limit = 0 means no device may ever be bound
    let hwids = match hwid {
        Some(hwid) => match queries::bind_device(conn, &license.id, hwid)? {
            DeviceBinding::LicenseMissing => {
                return Err(AppError::NotFound("Invalid license key".into()));
            }
            DeviceBinding::LimitReached(_) => return Err(AppError::DeviceLimitReached),
            DeviceBinding::Bound(hwids) => {
                tracing::info!(license_id = %license.id, hwid, "device bound");
                hwids
            }
            DeviceBinding::AlreadyBound(hwids) => hwids,
        },
        None => license.hwids.clone(),
    };

    let app_name = match queries::get_application_by_id(conn, &license.app_id) {
        Ok(Some(app)) => app.name,
        Ok(None) => UNKNOWN_APP_NAME.to_string(),
        Err(e) => {
            tracing::warn!(app_id = %license.app_id, "application lookup failed: {}", e);
            UNKNOWN_APP_NAME.to_string()
        }
    };

    Ok(LicenseView {
        id: license.id,
        key: license.key,
        status: license.status,
        expires_at: license.expires_at,
        created_at: license.created_at,
        hwid_limit: license.hwid_limit,
        hwids,
        app_name,
        app_id: license.app_id,
    })
}

/// Validate and write exactly one audit entry describing the outcome.
///
/// The audit write happens after the result is final and cannot alter it.
pub fn validate_and_record(state: &AppState, request: &ValidationRequest) -> Result<LicenseView> {
    let hwid = normalize_hwid(request.hwid.as_deref());
    let mut resolved = Resolved::default();

    let result = state.db.get().map_err(AppError::from).and_then(|mut conn| {
        validate_resolving(&mut conn, &request.key, hwid, &mut resolved)
    });

    let (status, message) = match &result {
        Ok(_) => (AuditStatus::Success, "Validation successful".to_string()),
        Err(e) => {
            tracing::debug!(kind = e.kind(), "license validation denied: {}", e);
            (AuditStatus::Denied, e.public_message())
        }
    };

    audit::record(
        &state.audit,
        state.audit_log_enabled,
        &NewAuditEntry {
            license_id: resolved.license_id,
            app_id: resolved.app_id,
            key: request.key.clone(),
            ip: request.ip.clone(),
            hwid: hwid.map(String::from),
            status,
            message,
        },
    );

    result
}

/// Issue a new license under an application the caller has already
/// confirmed `owner_id` owns.
pub fn create_license(
    conn: &Connection,
    key_prefix: &str,
    owner_id: &str,
    app_id: &str,
    input: &CreateLicense,
) -> Result<CreatedLicense> {
    create_license_with(conn, owner_id, app_id, input, || {
        queries::generate_license_key(key_prefix)
    })
}

fn create_license_with(
    conn: &Connection,
    owner_id: &str,
    app_id: &str,
    input: &CreateLicense,
    mut next_key: impl FnMut() -> String,
) -> Result<CreatedLicense> {
    let hwid_limit = input.hwid_limit.unwrap_or(DEFAULT_HWID_LIMIT);
    if !(0..=MAX_HWID_LIMIT).contains(&hwid_limit) {
        return Err(AppError::BadRequest(format!(
            "hwid_limit must be between 0 and {}",
            MAX_HWID_LIMIT
        )));
    }

    if input.duration < 0 {
        return Err(AppError::BadRequest(
            "Duration must be a positive integer in seconds".into(),
        ));
    }

    let note = input.note.as_deref().unwrap_or_default().trim().to_string();
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(AppError::BadRequest(format!(
            "Note must be at most {} characters",
            MAX_NOTE_LEN
        )));
    }

    let created_at = queries::now();
    let expires_at = if input.duration > 0 {
        Some(
            created_at
                .checked_add(input.duration)
                .ok_or_else(|| AppError::BadRequest("Duration is too large".into()))?,
        )
    } else {
        None
    };

    let mut new_license = NewLicense {
        key: next_key(),
        owner_id: owner_id.to_string(),
        app_id: app_id.to_string(),
        duration: input.duration,
        expires_at,
        hwid_limit,
        note,
        status: LicenseStatus::Active,
        created_at,
    };

    // A collision is retried once with a fresh key
    let license = match queries::insert_license(conn, &new_license) {
        Err(AppError::DuplicateKey) => {
            tracing::warn!("license key collision, regenerating");
            new_license.key = next_key();
            queries::insert_license(conn, &new_license)?
        }
        other => other?,
    };

    tracing::info!(license_id = %license.id, app_id, "license created");

    Ok(CreatedLicense {
        id: license.id,
        key: license.key,
        expires_at: license.expires_at,
    })
}

/// Hard delete. A second delete of the same id reports `NotFound`.
pub fn delete_license(conn: &Connection, id: &str) -> Result<()> {
    if !queries::delete_license(conn, id)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    tracing::info!(license_id = id, "license deleted");
    Ok(())
}

pub fn get_license(conn: &Connection, id: &str) -> Result<LicenseWithApp> {
    let license = queries::get_license_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    let app_name = queries::get_application_by_id(conn, &license.app_id)?
        .map(|a| a.name)
        .unwrap_or_else(|| UNKNOWN_APP_NAME.to_string());

    Ok(LicenseWithApp { license, app_name })
}

/// One page of an application's licenses, newest first, with dashboard counts.
pub fn list_licenses(conn: &Connection, app_id: &str, page: &PageQuery) -> Result<LicensePage> {
    let (items, total_list) =
        queries::list_licenses_for_app_paginated(conn, app_id, page.page_size(), page.offset())?;
    let counts = queries::count_licenses_for_app(conn, app_id, queries::now())?;

    Ok(LicensePage {
        items,
        total: counts.total,
        expired_count: counts.expired_count,
        banned_count: counts.banned_count,
        total_list,
        page: page.page(),
        page_size: page.page_size(),
        total_pages: page.total_pages(total_list),
    })
}

pub fn list_audit_log(conn: &Connection, license_id: &str, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>> {
    audit::list_for_license(conn, license_id, query.limit())
}

/// Administrative status change. `expired` is derived from `expires_at` and
/// cannot be set directly.
pub fn set_license_status(conn: &Connection, id: &str, status: LicenseStatus) -> Result<License> {
    if !status.is_administrative() {
        return Err(AppError::BadRequest(
            "Expiry is derived from expires_at and cannot be set".into(),
        ));
    }

    if !queries::update_license_status(conn, id, status)? {
        return Err(AppError::NotFound("License not found".into()));
    }

    tracing::info!(license_id = id, status = status.as_ref(), "license status changed");

    queries::get_license_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))
}

/// Release a bound device so its slot can be reused.
pub fn unbind_device(conn: &Connection, id: &str, hwid: &str) -> Result<License> {
    if !queries::unbind_device(conn, id, hwid)? {
        return Err(AppError::NotFound("Device not bound to this license".into()));
    }

    tracing::info!(license_id = id, hwid, "device unbound");

    queries::get_license_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn setup() -> (Connection, Application) {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let app = queries::create_application(
            &conn,
            "owner-1",
            &CreateApplication {
                name: "Test App".into(),
                description: String::new(),
            },
        )
        .unwrap();
        (conn, app)
    }

    fn input(duration: i64, hwid_limit: Option<i32>) -> CreateLicense {
        CreateLicense {
            duration,
            hwid_limit,
            note: None,
        }
    }

    #[test]
    fn duplicate_key_is_retried_once() {
        let (conn, app) = setup();
        let first = create_license_with(&conn, "owner-1", &app.id, &input(0, None), || {
            "KW-FIXED".to_string()
        })
        .unwrap();
        assert_eq!(first.key, "KW-FIXED");

        let mut keys = vec!["KW-FRESH".to_string(), "KW-FIXED".to_string()];
        let second = create_license_with(&conn, "owner-1", &app.id, &input(0, None), || {
            keys.pop().unwrap()
        })
        .unwrap();
        assert_eq!(second.key, "KW-FRESH");
    }

    #[test]
    fn second_collision_surfaces_duplicate_key() {
        let (conn, app) = setup();
        create_license_with(&conn, "owner-1", &app.id, &input(0, None), || {
            "KW-FIXED".to_string()
        })
        .unwrap();

        let err = create_license_with(&conn, "owner-1", &app.id, &input(0, None), || {
            "KW-FIXED".to_string()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey));
    }

    #[test]
    fn rejects_out_of_range_hwid_limit() {
        let (conn, app) = setup();
        for limit in [-1, 6] {
            let err = create_license(&conn, "KW", "owner-1", &app.id, &input(0, Some(limit)))
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
    }

    #[test]
    fn rejects_long_note() {
        let (conn, app) = setup();
        let long = CreateLicense {
            duration: 0,
            hwid_limit: None,
            note: Some("x".repeat(MAX_NOTE_LEN + 1)),
        };
        let err = create_license(&conn, "KW", "owner-1", &app.id, &long).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn blank_hwid_is_ignored() {
        let (mut conn, app) = setup();
        let created = create_license(&conn, "KW", "owner-1", &app.id, &input(0, Some(0))).unwrap();
        let view = validate_license(&mut conn, &created.key, Some("   ")).unwrap();
        assert!(view.hwids.is_empty());
    }

    #[test]
    fn expired_cannot_be_set_directly() {
        let (conn, app) = setup();
        let created = create_license(&conn, "KW", "owner-1", &app.id, &input(0, None)).unwrap();
        let err = set_license_status(&conn, &created.id, LicenseStatus::Expired).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
