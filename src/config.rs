use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    /// Prefix for generated license keys (e.g. "KW" -> KW-XXXX-...)
    pub license_key_prefix: String,
    /// Enable/disable audit logging entirely
    pub audit_log_enabled: bool,
    /// Days to retain audit logs before purging (0 = never purge)
    pub audit_log_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let audit_log_enabled = env::var("AUDIT_LOG_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let audit_log_retention_days: i64 = env::var("AUDIT_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        let license_key_prefix = env::var("LICENSE_KEY_PREFIX")
            .ok()
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "KW".to_string());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "keyward.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "keyward_audit.db".to_string()),
            license_key_prefix,
            audit_log_enabled,
            audit_log_retention_days,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
