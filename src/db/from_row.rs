//! Row mapping shared by the query functions.
//!
//! Each `*_COLS` constant lists columns in the order its `FromRow` impl reads
//! them, so a `SELECT {COLS} FROM ...` always lines up with the mapping.

use std::str::FromStr;

use rusqlite::{Connection, Row, ToSql, types::Type};

use crate::error::Result;
use crate::models::*;

pub const APPLICATION_COLS: &str = "id, owner_id, name, description, created_at";

pub const API_KEY_COLS: &str = "id, owner_id, name, prefix, key_hash, created_at, revoked_at";

pub const LICENSE_COLS: &str = "id, key, owner_id, app_id, duration, expires_at, hwid_limit, note, status, created_at, updated_at";

pub const AUDIT_LOG_COLS: &str =
    "id, license_id, app_id, key, ip, hwid, status, message, created_at";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Parse a strum-backed enum column, surfacing bad values as a conversion error.
fn parse_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl FromRow for Application {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Application {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for ApiKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ApiKey {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            prefix: row.get(3)?,
            key_hash: row.get(4)?,
            created_at: row.get(5)?,
            revoked_at: row.get(6)?,
        })
    }
}

/// Devices live in `license_devices`; callers fill `hwids` after loading.
impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            key: row.get(1)?,
            owner_id: row.get(2)?,
            app_id: row.get(3)?,
            duration: row.get(4)?,
            expires_at: row.get(5)?,
            hwid_limit: row.get(6)?,
            hwids: Vec::new(),
            note: row.get(7)?,
            status: parse_enum(row, 8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for AuditLogEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AuditLogEntry {
            id: row.get(0)?,
            license_id: row.get(1)?,
            app_id: row.get(2)?,
            key: row.get(3)?,
            ip: row.get(4)?,
            hwid: row.get(5)?,
            status: parse_enum(row, 6)?,
            message: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| T::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
