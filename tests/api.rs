//! HTTP tests for the public validation endpoint and the tenant license routes.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::*;

struct Fixture {
    state: AppState,
    app: Application,
    token: String,
}

fn fixture() -> Fixture {
    let state = create_test_app_state();
    let (app, token) = {
        let conn = state.db.get().unwrap();
        let app = create_test_app(&conn, OWNER, "Desktop Suite");
        let token = create_test_api_key(&conn, OWNER);
        (app, token)
    };
    Fixture { state, app, token }
}

fn router(state: &AppState) -> Router {
    keyward::app(state.clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("Response should be valid JSON")
    };
    (status, json)
}

fn validate_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/validate")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.23, 10.0.0.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn tenant_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn create_license_via_api(f: &Fixture, body: Value) -> Value {
    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "POST",
            &format!("/apps/{}/licenses", f.app.id),
            &f.token,
            Some(body),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json
}

// ============ Public ============

#[tokio::test]
async fn test_health() {
    let state = create_test_app_state();
    let (status, json) = send(
        router(&state),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_validate_unknown_key_returns_404_and_is_audited() {
    let state = create_test_app_state();
    let (status, json) = send(
        router(&state),
        validate_request(json!({ "license_key": "TEST-UNKNOWN", "hwid": "hw-9" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["kind"], "not_found");
    assert_eq!(json["message"], "Invalid license key");

    let entries = audit_entries_for_key(&state, "TEST-UNKNOWN");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].license_id, None);
    assert_eq!(entries[0].status, AuditStatus::Denied);
    assert_eq!(entries[0].ip, "198.51.100.23");
}

#[tokio::test]
async fn test_validate_requires_key() {
    let state = create_test_app_state();
    let (status, _) = send(router(&state), validate_request(json!({ "hwid": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_validate_success_binds_device() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": 60, "hwid_limit": 1 })).await;
    let key = created["key"].as_str().unwrap();
    assert!(key.starts_with("TEST-"));

    let (status, json) = send(
        router(&f.state),
        validate_request(json!({ "license_key": key, "hwid": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["license"]["hwids"], json!(["A"]));
    assert_eq!(json["license"]["app_name"], "Desktop Suite");
    assert_eq!(json["license"]["app_id"], f.app.id.as_str());
    assert_eq!(json["license"]["expires_at"], created["expires_at"]);

    let (status, json) = send(
        router(&f.state),
        validate_request(json!({ "license_key": key, "hwid": "B" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "device_limit_reached");
    assert_eq!(json["message"], "Maximum device count reached");

    let entries = audit_entries_for_key(&f.state, key);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, AuditStatus::Denied);
    assert_eq!(entries[1].status, AuditStatus::Success);
}

// ============ Tenant routes ============

#[tokio::test]
async fn test_tenant_routes_require_api_key() {
    let f = fixture();
    let (status, _) = send(
        router(&f.state),
        Request::builder()
            .uri(format!("/apps/{}/licenses", f.app.id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        router(&f.state),
        tenant_request("GET", &format!("/apps/{}/licenses", f.app.id), "kw_bogus", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_api_key_is_rejected() {
    let f = fixture();
    let (api_key, secret) = {
        let conn = f.state.db.get().unwrap();
        queries::create_api_key(&conn, OWNER, "ci").unwrap()
    };
    let uri = format!("/apps/{}/licenses", f.app.id);

    let (status, _) = send(router(&f.state), tenant_request("GET", &uri, &secret, None)).await;
    assert_eq!(status, StatusCode::OK);

    {
        let conn = f.state.db.get().unwrap();
        assert!(queries::revoke_api_key(&conn, &api_key.id).unwrap());
        assert!(!queries::revoke_api_key(&conn, &api_key.id).unwrap());
    }

    let (status, json) = send(router(&f.state), tenant_request("GET", &uri, &secret, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "unauthorized");

    // Other keys for the same tenant keep working
    let (status, _) = send(router(&f.state), tenant_request("GET", &uri, &f.token, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_other_tenant_sees_not_found() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": 0 })).await;
    let license_id = created["id"].as_str().unwrap();

    let other_token = {
        let conn = f.state.db.get().unwrap();
        create_test_api_key(&conn, OTHER_OWNER)
    };

    let uris = [
        ("GET", format!("/apps/{}/licenses", f.app.id)),
        ("GET", format!("/apps/{}/licenses/{}", f.app.id, license_id)),
        ("DELETE", format!("/apps/{}/licenses/{}", f.app.id, license_id)),
        ("GET", format!("/apps/{}/licenses/{}/logs", f.app.id, license_id)),
    ];

    for (method, uri) in &uris {
        let (status, json) = send(router(&f.state), tenant_request(method, uri, &other_token, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        assert_eq!(json["kind"], "not_found");
    }

    // Same answer as an application that does not exist at all
    let (_, foreign) = send(
        router(&f.state),
        tenant_request("GET", &format!("/apps/{}/licenses", f.app.id), &other_token, None),
    )
    .await;
    let (status, missing) = send(
        router(&f.state),
        tenant_request("GET", "/apps/no-such-app/licenses", &other_token, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(foreign, missing);

    // The license survived the other tenant's delete attempt
    let conn = f.state.db.get().unwrap();
    assert!(queries::get_license_by_id(&conn, license_id).unwrap().is_some());
}

#[tokio::test]
async fn test_license_in_another_app_is_not_found() {
    let f = fixture();
    let other_app = {
        let conn = f.state.db.get().unwrap();
        create_test_app(&conn, OWNER, "Second App")
    };
    let created = create_license_via_api(&f, json!({ "duration": 0 })).await;

    let (status, foreign) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses/{}", other_app.id, created["id"].as_str().unwrap()),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, missing) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses/no-such-license", other_app.id),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(foreign, missing);
    assert_eq!(foreign["error"], "License not found");
}

#[tokio::test]
async fn test_create_license_validation() {
    let f = fixture();
    for body in [
        json!({ "duration": 60, "hwid_limit": 6 }),
        json!({ "duration": -5 }),
        json!({ "duration": 0, "note": "n".repeat(501) }),
    ] {
        let (status, json) = send(
            router(&f.state),
            tenant_request(
                "POST",
                &format!("/apps/{}/licenses", f.app.id),
                &f.token,
                Some(body),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "bad_request");
    }
}

#[tokio::test]
async fn test_create_without_duration_never_expires() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "note": "  trial  " })).await;
    assert!(created["expires_at"].is_null());

    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses/{}", f.app.id, created["id"].as_str().unwrap()),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["note"], "trial");
    assert_eq!(json["hwid_limit"], 1);
    assert_eq!(json["duration"], "0");
    assert_eq!(json["status"], "active");
    assert_eq!(json["app_name"], "Desktop Suite");
}

#[tokio::test]
async fn test_create_license_with_string_duration() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": "60", "hwid_limit": 1 })).await;

    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses/{}", f.app.id, created["id"].as_str().unwrap()),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["duration"], "60");

    let created_at = json["created_at"].as_i64().unwrap();
    assert_eq!(created["expires_at"].as_i64(), Some(created_at + 60));
    assert_eq!(json["expires_at"], created["expires_at"]);
}

#[tokio::test]
async fn test_list_licenses_with_pagination() {
    let f = fixture();
    for _ in 0..3 {
        create_license_via_api(&f, json!({ "duration": 3600 })).await;
    }

    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses?page=2&page_size=2", f.app.id),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["total"], 3);
    assert_eq!(json["expired_count"], 0);
    assert_eq!(json["banned_count"], 0);
    assert_eq!(json["total_list"], 3);
    assert_eq!(json["page"], 2);
    assert_eq!(json["total_pages"], 2);
}

#[tokio::test]
async fn test_ban_then_validate_is_not_active() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": 0 })).await;
    let id = created["id"].as_str().unwrap();
    let key = created["key"].as_str().unwrap();

    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "PUT",
            &format!("/apps/{}/licenses/{}/status", f.app.id, id),
            &f.token,
            Some(json!({ "status": "banned" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "banned");

    let (status, json) = send(
        router(&f.state),
        validate_request(json!({ "license_key": key })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "not_active");

    let (status, _) = send(
        router(&f.state),
        tenant_request(
            "PUT",
            &format!("/apps/{}/licenses/{}/status", f.app.id, id),
            &f.token,
            Some(json!({ "status": "expired" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unbind_device_via_api() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": 0, "hwid_limit": 1 })).await;
    let id = created["id"].as_str().unwrap();
    let key = created["key"].as_str().unwrap();

    send(router(&f.state), validate_request(json!({ "license_key": key, "hwid": "old" }))).await;

    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "DELETE",
            &format!("/apps/{}/licenses/{}/devices/old", f.app.id, id),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hwids"], json!([]));

    let (status, json) = send(
        router(&f.state),
        validate_request(json!({ "license_key": key, "hwid": "new" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["license"]["hwids"], json!(["new"]));
}

#[tokio::test]
async fn test_license_logs_newest_first() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": 0, "hwid_limit": 1 })).await;
    let id = created["id"].as_str().unwrap();
    let key = created["key"].as_str().unwrap();

    send(router(&f.state), validate_request(json!({ "license_key": key, "hwid": "A" }))).await;
    send(router(&f.state), validate_request(json!({ "license_key": key, "hwid": "B" }))).await;

    let (status, json) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses/{}/logs", f.app.id, id),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs = json["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["status"], "denied");
    assert_eq!(logs[0]["hwid"], "B");
    assert_eq!(logs[1]["status"], "success");
    assert_eq!(logs[1]["ip"], "198.51.100.23");

    let (_, json) = send(
        router(&f.state),
        tenant_request(
            "GET",
            &format!("/apps/{}/licenses/{}/logs?limit=1", f.app.id, id),
            &f.token,
            None,
        ),
    )
    .await;
    assert_eq!(json["logs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_license_via_api() {
    let f = fixture();
    let created = create_license_via_api(&f, json!({ "duration": 0 })).await;
    let uri = format!("/apps/{}/licenses/{}", f.app.id, created["id"].as_str().unwrap());

    let (status, json) = send(router(&f.state), tenant_request("DELETE", &uri, &f.token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);

    let (status, _) = send(router(&f.state), tenant_request("DELETE", &uri, &f.token, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        router(&f.state),
        validate_request(json!({ "license_key": created["key"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");
}
