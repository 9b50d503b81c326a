use serde::{Deserialize, Serialize, Serializer};
use strum::{AsRefStr, EnumString};

/// Highest device count a license may be bound to.
pub const MAX_HWID_LIMIT: i32 = 5;

/// Longest note accepted on a license.
pub const MAX_NOTE_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Suspended,
    /// Legacy persisted value. Liveness is always computed from `expires_at`.
    Expired,
    Banned,
}

impl LicenseStatus {
    /// Whether an administrator may put a license into this state directly.
    pub fn is_administrative(&self) -> bool {
        !matches!(self, LicenseStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub key: String,
    pub owner_id: String,
    pub app_id: String,
    /// Requested lifetime in seconds (0 = non-expiring)
    #[serde(serialize_with = "as_string", deserialize_with = "from_string")]
    pub duration: i64,
    pub expires_at: Option<i64>,
    pub hwid_limit: i32,
    /// Bound device identifiers, oldest first
    pub hwids: Vec<String>,
    pub note: String,
    pub status: LicenseStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl License {
    /// True when `expires_at` is set and strictly before `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }
}

/// Row to insert into the license store.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub key: String,
    pub owner_id: String,
    pub app_id: String,
    pub duration: i64,
    pub expires_at: Option<i64>,
    pub hwid_limit: i32,
    pub note: String,
    pub status: LicenseStatus,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateLicense {
    /// Lifetime in seconds; 0 means the license never expires
    #[serde(default, deserialize_with = "from_string")]
    pub duration: i64,
    #[serde(default)]
    pub hwid_limit: Option<i32>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedLicense {
    pub id: String,
    pub key: String,
    pub expires_at: Option<i64>,
}

/// What a successful validation hands back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseView {
    pub id: String,
    pub key: String,
    pub status: LicenseStatus,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub hwid_limit: i32,
    pub hwids: Vec<String>,
    pub app_name: String,
    pub app_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseWithApp {
    #[serde(flatten)]
    pub license: License,
    pub app_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LicenseCounts {
    /// Licenses whose stored status is active
    pub total: i64,
    /// Past `expires_at` or stored as expired, excluding banned
    pub expired_count: i64,
    pub banned_count: i64,
}

#[derive(Debug, Serialize)]
pub struct LicensePage {
    pub items: Vec<License>,
    pub total: i64,
    pub expired_count: i64,
    pub banned_count: i64,
    pub total_list: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLicenseStatus {
    pub status: LicenseStatus,
}

fn as_string<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

fn from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
