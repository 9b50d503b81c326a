//! Validation audit trail.
//!
//! Writes are best-effort: a failed insert is logged and dropped so it can
//! never change a validation response that has already been decided.

use rusqlite::Connection;

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::models::{AuditLogEntry, NewAuditEntry};

/// Append one audit entry. Never fails.
pub fn record(pool: &DbPool, enabled: bool, entry: &NewAuditEntry) {
    if !enabled {
        return;
    }

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(key = %entry.key, "audit log unavailable: {}", e);
            return;
        }
    };

    if let Err(e) = queries::create_audit_log(&conn, entry) {
        tracing::error!(key = %entry.key, status = entry.status.as_ref(), "audit log write failed: {}", e);
    }
}

/// Entries for a license, newest first, at most `limit`.
pub fn list_for_license(
    conn: &Connection,
    license_id: &str,
    limit: i64,
) -> Result<Vec<AuditLogEntry>> {
    queries::list_audit_logs_for_license(conn, license_id, limit)
}
