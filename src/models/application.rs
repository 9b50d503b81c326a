use serde::{Deserialize, Serialize};

/// Tenant-owned namespace that licenses are issued under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
