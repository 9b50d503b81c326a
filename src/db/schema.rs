use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_applications_owner ON applications(owner_id);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    prefix TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL,
    revoked_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_api_keys_owner ON api_keys(owner_id);

CREATE TABLE IF NOT EXISTS licenses (
    id TEXT PRIMARY KEY,
    key TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 0,
    expires_at INTEGER,
    hwid_limit INTEGER NOT NULL DEFAULT 1 CHECK (hwid_limit BETWEEN 0 AND 5),
    note TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_licenses_owner ON licenses(owner_id);
CREATE INDEX IF NOT EXISTS idx_licenses_app ON licenses(app_id, created_at);
CREATE INDEX IF NOT EXISTS idx_licenses_status ON licenses(status);

CREATE TABLE IF NOT EXISTS license_devices (
    license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
    hwid TEXT NOT NULL,
    bound_at INTEGER NOT NULL,
    PRIMARY KEY (license_id, hwid)
);
"#;

const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    license_id TEXT,
    app_id TEXT,
    key TEXT NOT NULL,
    ip TEXT NOT NULL,
    hwid TEXT,
    status TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_logs_license ON audit_logs(license_id, created_at);
CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at);
"#;

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// The audit log lives in its own database so heavy logging never contends
/// with the license tables.
pub fn init_audit_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(AUDIT_SCHEMA)?;
    Ok(())
}
