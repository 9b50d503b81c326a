use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    API_KEY_COLS, APPLICATION_COLS, AUDIT_LOG_COLS, LICENSE_COLS, query_all, query_one,
};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Hash a bearer secret for storage/lookup (plaintext keys are never stored).
pub fn hash_secret(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"keyward-api-key-v1:");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ============ Applications ============

pub fn create_application(
    conn: &Connection,
    owner_id: &str,
    input: &CreateApplication,
) -> Result<Application> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO applications (id, owner_id, name, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, owner_id, &input.name, &input.description, now],
    )?;

    Ok(Application {
        id,
        owner_id: owner_id.to_string(),
        name: input.name.clone(),
        description: input.description.clone(),
        created_at: now,
    })
}

pub fn get_application_by_id(conn: &Connection, id: &str) -> Result<Option<Application>> {
    query_one(
        conn,
        &format!("SELECT {} FROM applications WHERE id = ?1", APPLICATION_COLS),
        &[&id],
    )
}

// ============ API Keys ============

/// Generate an API key with kw_ prefix
pub fn generate_api_key() -> String {
    format!("kw_{}", Uuid::new_v4().simple())
}

/// Issue an API key for a tenant. Returns the stored record and the plaintext key.
pub fn create_api_key(conn: &Connection, owner_id: &str, name: &str) -> Result<(ApiKey, String)> {
    let id = gen_id();
    let now = now();
    let key = generate_api_key();
    let prefix = key[..8].to_string();
    let key_hash = hash_secret(&key);

    conn.execute(
        "INSERT INTO api_keys (id, owner_id, name, prefix, key_hash, created_at, revoked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
        params![&id, owner_id, name, &prefix, &key_hash, now],
    )?;

    Ok((
        ApiKey {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            prefix,
            key_hash,
            created_at: now,
            revoked_at: None,
        },
        key,
    ))
}

/// Resolve a presented bearer secret to its (unrevoked) API key.
pub fn get_api_key_by_secret(conn: &Connection, secret: &str) -> Result<Option<ApiKey>> {
    let hash = hash_secret(secret);
    query_one(
        conn,
        &format!(
            "SELECT {} FROM api_keys WHERE key_hash = ?1 AND revoked_at IS NULL",
            API_KEY_COLS
        ),
        &[&hash],
    )
}

pub fn revoke_api_key(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE api_keys SET revoked_at = ?1 WHERE id = ?2 AND revoked_at IS NULL",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

// ============ Licenses ============

/// Generate a license key in the format: PREFIX-XXXX-XXXX-XXXX-XXXX-XXXX
///
/// 20 characters from a 32-symbol alphabet gives 100 bits of randomness.
pub fn generate_license_key(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();

    let mut part = || -> String {
        (0..4)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect()
    };

    format!(
        "{}-{}-{}-{}-{}-{}",
        prefix,
        part(),
        part(),
        part(),
        part(),
        part()
    )
}

/// Insert a license. Fails with `DuplicateKey` if the key is already taken.
pub fn insert_license(conn: &Connection, input: &NewLicense) -> Result<License> {
    let id = gen_id();

    let inserted = conn.execute(
        "INSERT INTO licenses (id, key, owner_id, app_id, duration, expires_at, hwid_limit, note, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            &id,
            &input.key,
            &input.owner_id,
            &input.app_id,
            input.duration,
            input.expires_at,
            input.hwid_limit,
            &input.note,
            input.status.as_ref(),
            input.created_at
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Err(AppError::DuplicateKey),
        Err(e) => return Err(e.into()),
    }

    Ok(License {
        id,
        key: input.key.clone(),
        owner_id: input.owner_id.clone(),
        app_id: input.app_id.clone(),
        duration: input.duration,
        expires_at: input.expires_at,
        hwid_limit: input.hwid_limit,
        hwids: Vec::new(),
        note: input.note.clone(),
        status: input.status,
        created_at: input.created_at,
        updated_at: input.created_at,
    })
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    let license: Option<License> = query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )?;
    with_hwids(conn, license)
}

pub fn get_license_by_key(conn: &Connection, key: &str) -> Result<Option<License>> {
    let license: Option<License> = query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        &[&key],
    )?;
    with_hwids(conn, license)
}

fn with_hwids(conn: &Connection, license: Option<License>) -> Result<Option<License>> {
    match license {
        Some(mut license) => {
            license.hwids = list_hwids(conn, &license.id)?;
            Ok(Some(license))
        }
        None => Ok(None),
    }
}

/// Bound device ids for a license, oldest first.
pub fn list_hwids(conn: &Connection, license_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT hwid FROM license_devices WHERE license_id = ?1 ORDER BY bound_at, rowid",
    )?;
    let hwids = stmt
        .query_map(params![license_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(hwids)
}

/// Fill `hwids` for a page of licenses with a single query.
fn attach_hwids(conn: &Connection, licenses: &mut [License]) -> Result<()> {
    if licenses.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; licenses.len()].join(", ");
    let sql = format!(
        "SELECT license_id, hwid FROM license_devices WHERE license_id IN ({}) ORDER BY bound_at, rowid",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let ids = licenses.iter().map(|l| l.id.as_str());
    let rows = stmt.query_map(rusqlite::params_from_iter(ids), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut by_license: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (license_id, hwid) = row?;
        by_license.entry(license_id).or_default().push(hwid);
    }

    for license in licenses.iter_mut() {
        license.hwids = by_license.remove(&license.id).unwrap_or_default();
    }
    Ok(())
}

pub fn delete_license(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM licenses WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn update_license_status(conn: &Connection, id: &str, status: LicenseStatus) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_ref(), now(), id],
    )?;
    Ok(affected > 0)
}

pub fn list_licenses_for_app_paginated(
    conn: &Connection,
    app_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<License>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE app_id = ?1",
        params![app_id],
        |row| row.get(0),
    )?;

    let mut items: Vec<License> = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE app_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
            LICENSE_COLS
        ),
        params![app_id, limit, offset],
    )?;
    attach_hwids(conn, &mut items)?;

    Ok((items, total))
}

/// Dashboard counters for an application, evaluated against `now`.
///
/// The expired count includes suspended licenses and excludes banned ones.
pub fn count_licenses_for_app(conn: &Connection, app_id: &str, now: i64) -> Result<LicenseCounts> {
    conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN ((expires_at IS NOT NULL AND expires_at < ?2) OR status = 'expired')
                               AND status != 'banned' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'banned' THEN 1 ELSE 0 END), 0)
         FROM licenses WHERE app_id = ?1",
        params![app_id, now],
        |row| {
            Ok(LicenseCounts {
                total: row.get(0)?,
                expired_count: row.get(1)?,
                banned_count: row.get(2)?,
            })
        },
    )
    .map_err(Into::into)
}

// ============ Devices ============

/// Result of attempting to bind a device to a license
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceBinding {
    /// Device was already bound; nothing changed
    AlreadyBound(Vec<String>),
    /// Device was added
    Bound(Vec<String>),
    /// License is at its device limit; nothing changed
    LimitReached(Vec<String>),
    /// License row no longer exists (deleted after the caller looked it up)
    LicenseMissing,
}

/// Atomically bind a device to a license, enforcing the device limit.
///
/// Runs in an IMMEDIATE transaction so the write lock is taken before the
/// limit, membership and count checks. Concurrent binds for the same license
/// are serialized and can never push the device count above the limit stored
/// on the license row at the time of the bind.
///
/// # PostgreSQL Migration Note
/// Use `SELECT hwid_limit FROM licenses WHERE id = $1 FOR UPDATE` before
/// counting devices to get the same row-level serialization.
pub fn bind_device(conn: &mut Connection, license_id: &str, hwid: &str) -> Result<DeviceBinding> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let limit: Option<i32> = tx
        .query_row(
            "SELECT hwid_limit FROM licenses WHERE id = ?1",
            params![license_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(limit) = limit else {
        return Ok(DeviceBinding::LicenseMissing);
    };

    let mut hwids = list_hwids(&tx, license_id)?;

    if hwids.iter().any(|h| h == hwid) {
        return Ok(DeviceBinding::AlreadyBound(hwids));
    }

    if hwids.len() as i64 >= limit as i64 {
        // Dropping the transaction rolls it back
        return Ok(DeviceBinding::LimitReached(hwids));
    }

    let now = now();
    tx.execute(
        "INSERT INTO license_devices (license_id, hwid, bound_at) VALUES (?1, ?2, ?3)",
        params![license_id, hwid, now],
    )?;
    tx.execute(
        "UPDATE licenses SET updated_at = ?1 WHERE id = ?2",
        params![now, license_id],
    )?;
    tx.commit()?;

    hwids.push(hwid.to_string());
    Ok(DeviceBinding::Bound(hwids))
}

pub fn unbind_device(conn: &Connection, license_id: &str, hwid: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM license_devices WHERE license_id = ?1 AND hwid = ?2",
        params![license_id, hwid],
    )?;
    if deleted > 0 {
        conn.execute(
            "UPDATE licenses SET updated_at = ?1 WHERE id = ?2",
            params![now(), license_id],
        )?;
    }
    Ok(deleted > 0)
}

// ============ Audit Logs ============

pub fn create_audit_log(conn: &Connection, input: &NewAuditEntry) -> Result<AuditLogEntry> {
    let id = gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO audit_logs (id, license_id, app_id, key, ip, hwid, status, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            &input.license_id,
            &input.app_id,
            &input.key,
            &input.ip,
            &input.hwid,
            input.status.as_ref(),
            &input.message,
            created_at
        ],
    )?;

    Ok(AuditLogEntry {
        id,
        license_id: input.license_id.clone(),
        app_id: input.app_id.clone(),
        key: input.key.clone(),
        ip: input.ip.clone(),
        hwid: input.hwid.clone(),
        status: input.status,
        message: input.message.clone(),
        created_at,
    })
}

/// Audit entries for a license, newest first.
pub fn list_audit_logs_for_license(
    conn: &Connection,
    license_id: &str,
    limit: i64,
) -> Result<Vec<AuditLogEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_logs WHERE license_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            AUDIT_LOG_COLS
        ),
        params![license_id, limit],
    )
}

/// Audit entries recorded for a raw key, newest first. Covers attempts with
/// keys that never resolved to a license.
pub fn list_audit_logs_for_key(
    conn: &Connection,
    key: &str,
    limit: i64,
) -> Result<Vec<AuditLogEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_logs WHERE key = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            AUDIT_LOG_COLS
        ),
        params![key, limit],
    )
}

// ============ Audit Log Maintenance ============

/// Purge audit entries older than the retention window.
/// Returns the number of deleted records.
/// Called on startup when AUDIT_LOG_RETENTION_DAYS > 0.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now().saturating_sub(retention_days.saturating_mul(86400));
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
