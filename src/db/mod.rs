mod from_row;
pub mod queries;
mod schema;

pub use schema::{init_audit_db, init_db};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared handler state. Both pools are constructed once at startup and
/// passed in explicitly; nothing in the crate caches a global connection.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub audit: DbPool,
    pub audit_log_enabled: bool,
    pub license_key_prefix: String,
}

/// Open a file-backed pool. WAL lets readers proceed while a device bind
/// holds the write lock; busy_timeout makes writers queue instead of failing.
pub fn create_pool(path: &str, max_size: u32) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
    });
    Pool::builder().max_size(max_size).build(manager)
}

/// Single-connection in-memory pool. One connection keeps every checkout on
/// the same database, which is what tests want.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().max_size(1).build(manager)
}
