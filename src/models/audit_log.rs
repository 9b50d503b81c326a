use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Default and maximum number of entries returned per license.
pub const AUDIT_LOG_LIMIT: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Denied,
}

/// One validation attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    /// None when the presented key did not resolve to a license
    pub license_id: Option<String>,
    pub app_id: Option<String>,
    /// Raw key as submitted, even if invalid
    pub key: String,
    pub ip: String,
    pub hwid: Option<String>,
    pub status: AuditStatus,
    pub message: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub license_id: Option<String>,
    pub app_id: Option<String>,
    pub key: String,
    pub ip: String,
    pub hwid: Option<String>,
    pub status: AuditStatus,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<i64>,
}

impl AuditLogQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(AUDIT_LOG_LIMIT).clamp(1, AUDIT_LOG_LIMIT)
    }
}
