use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("License expired")]
    Expired,

    #[error("This license is not active")]
    NotActive,

    #[error("Maximum device count reached")]
    DeviceLimitReached,

    #[error("License key already exists")]
    DuplicateKey,

    /// Resource exists but is outside the caller's tenant. Rendered exactly
    /// like the `NotFound` carrying the same message.
    #[error("{0}")]
    ScopeViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl AppError {
    /// Machine-readable failure kind. Callers branch on this, never on the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::NotFound(_) | AppError::ScopeViolation(_) => "not_found",
            AppError::Expired => "expired",
            AppError::NotActive => "not_active",
            AppError::DeviceLimitReached => "device_limit_reached",
            AppError::DuplicateKey => "duplicate_key",
            AppError::Database(_) | AppError::Pool(_) => "storage_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) | AppError::ScopeViolation(_) => StatusCode::NOT_FOUND,
            AppError::Expired | AppError::NotActive | AppError::DeviceLimitReached => {
                StatusCode::FORBIDDEN
            }
            AppError::DuplicateKey => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show to the caller. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Pool(_) => "Storage unavailable".to_string(),
            other => other.to_string(),
        }
    }

    /// True for failures that are the caller's answer rather than a server fault.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_)
                | AppError::Expired
                | AppError::NotActive
                | AppError::DeviceLimitReached
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": self.public_message(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
