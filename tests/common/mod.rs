//! Shared fixtures for integration tests.
#![allow(dead_code)]

pub use keyward::db::{AppState, queries};
pub use keyward::models::*;

use rusqlite::Connection;

pub const OWNER: &str = "tenant-1";
pub const OTHER_OWNER: &str = "tenant-2";

/// App state backed by two single-connection in-memory databases.
///
/// Each pool holds one connection, so tests must drop any connection they
/// check out before calling code that checks out its own.
pub fn create_test_app_state() -> AppState {
    let db = keyward::db::create_memory_pool().expect("db pool");
    {
        let conn = db.get().unwrap();
        keyward::db::init_db(&conn).unwrap();
    }

    let audit = keyward::db::create_memory_pool().expect("audit pool");
    {
        let conn = audit.get().unwrap();
        keyward::db::init_audit_db(&conn).unwrap();
    }

    AppState {
        db,
        audit,
        audit_log_enabled: true,
        license_key_prefix: "TEST".to_string(),
    }
}

pub fn now() -> i64 {
    queries::now()
}

pub fn future_timestamp(days: i64) -> i64 {
    now() + days * 86400
}

pub fn past_timestamp(days: i64) -> i64 {
    now() - days * 86400
}

pub fn create_test_app(conn: &Connection, owner_id: &str, name: &str) -> Application {
    queries::create_application(
        conn,
        owner_id,
        &CreateApplication {
            name: name.to_string(),
            description: String::new(),
        },
    )
    .expect("create application")
}

/// Issue an API key for `owner_id` and return the plaintext bearer token.
pub fn create_test_api_key(conn: &Connection, owner_id: &str) -> String {
    let (_, secret) = queries::create_api_key(conn, owner_id, "test").expect("create api key");
    secret
}

/// Insert a license row directly, bypassing creation rules, so tests can
/// set up expired or non-active records.
pub fn insert_test_license(
    conn: &Connection,
    app: &Application,
    expires_at: Option<i64>,
    hwid_limit: i32,
    status: LicenseStatus,
) -> License {
    queries::insert_license(
        conn,
        &NewLicense {
            key: queries::generate_license_key("TEST"),
            owner_id: app.owner_id.clone(),
            app_id: app.id.clone(),
            duration: 0,
            expires_at,
            hwid_limit,
            note: String::new(),
            status,
            created_at: now(),
        },
    )
    .expect("insert license")
}

pub fn create_input(duration: i64, hwid_limit: Option<i32>) -> CreateLicense {
    CreateLicense {
        duration,
        hwid_limit,
        note: None,
    }
}

pub fn audit_entries_for_key(state: &AppState, key: &str) -> Vec<AuditLogEntry> {
    let conn = state.audit.get().unwrap();
    queries::list_audit_logs_for_key(&conn, key, 1000).unwrap()
}
