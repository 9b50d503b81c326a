use axum::{extract::State, http::HeaderMap, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::licensing::{self, ValidationRequest};
use crate::models::LicenseView;
use crate::util::extract_client_ip;

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    #[serde(default)]
    pub license_key: String,
    #[serde(default)]
    pub hwid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /validate
/// Validate a license key, binding `hwid` if given. Every attempt with a
/// non-empty key is written to the audit log, success or not.
pub async fn validate_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ValidateBody>,
) -> Result<(StatusCode, Json<ValidateResponse>)> {
    if body.license_key.trim().is_empty() {
        return Err(AppError::BadRequest("License key is required".into()));
    }

    let request = ValidationRequest {
        key: body.license_key,
        hwid: body.hwid,
        ip: extract_client_ip(&headers),
    };

    let response = match licensing::validate_and_record(&state, &request) {
        Ok(view) => (
            StatusCode::OK,
            Json(ValidateResponse {
                success: true,
                license: Some(view),
                kind: None,
                message: None,
            }),
        ),
        Err(e) => {
            if !e.is_denial() {
                tracing::error!("validation failed: {}", e);
            }
            (
                e.status_code(),
                Json(ValidateResponse {
                    success: false,
                    license: None,
                    kind: Some(e.kind()),
                    message: Some(e.public_message()),
                }),
            )
        }
    };

    Ok(response)
}
