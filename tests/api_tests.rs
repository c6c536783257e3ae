//! Integration tests for the HTTP API, driven through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use licensegate::engine::LicenseEngine;
use licensegate::server::{build_router, AppState, ADMIN_SECRET_HEADER, REQUEST_ID_HEADER};
use licensegate::storage::{MemoryStore, Storage};

const SECRET: &str = "test-admin-secret";

fn setup_app_with_secret(secret: &str) -> Router {
    let engine = LicenseEngine::with_defaults(Storage::Memory(MemoryStore::new()));
    build_router(AppState::new(Arc::new(engine), secret))
}

fn setup_app() -> Router {
    setup_app_with_secret(SECRET)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    secret: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(secret) = secret {
        builder = builder.header(ADMIN_SECRET_HEADER, secret);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn admin(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(app, method, uri, Some(SECRET), body).await
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, json) = admin(app, Method::POST, "/api/licenses", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["license"].clone()
}

async fn validate(app: &Router, key: &str, account: Value) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/validate",
        None,
        Some(json!({ "licenseKey": key, "accountNumber": account })),
    )
    .await
}

#[tokio::test]
async fn root_and_health() {
    let app = setup_app();

    let (status, json) = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "online");

    let (status, json) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage"]["backend"], "memory");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = setup_app();
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn validate_requires_key_and_account() {
    let app = setup_app();

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/validate",
        None,
        Some(json!({ "accountNumber": "1001" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "MISSING_FIELD");
    assert_eq!(json["error"]["details"]["field"], "licenseKey");

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/validate",
        None,
        Some(json!({ "licenseKey": "MQL5-X" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["field"], "accountNumber");
}

#[tokio::test]
async fn malformed_json_is_invalid_request() {
    let app = setup_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/validate")
        .header("content-type", "application/json")
        .body(Body::from("{ nope"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_key_is_a_200_denial() {
    let app = setup_app();
    let (status, json) = validate(&app, "MQL5-NOPE", json!("1001")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    assert_eq!(json["error"], "LICENSE_NOT_FOUND");
}

#[tokio::test]
async fn numeric_account_numbers_are_accepted() {
    let app = setup_app();
    let license = create(&app, json!({ "accountNumbers": [12345678] })).await;
    assert_eq!(license["accountNumbers"][0], "12345678");

    let key = license["key"].as_str().unwrap();
    let (status, json) = validate(&app, key, json!(12345678)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert_eq!(json["license"]["accountsUsed"], 1);
}

#[tokio::test]
async fn admin_routes_require_secret() {
    let app = setup_app();

    let (status, json) = send(&app, Method::GET, "/api/licenses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "MISSING_SECRET");

    let (status, json) = send(&app, Method::GET, "/api/stats", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");

    let (status, json) = admin(&app, Method::GET, "/api/licenses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn admin_routes_disabled_without_secret() {
    let app = setup_app_with_secret("");
    let (status, json) = send(&app, Method::GET, "/api/licenses", Some(""), None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json["error"]["code"], "AUTH_DISABLED");

    // public endpoint still works
    let (status, _) = validate(&app, "MQL5-X", json!("1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_get_and_conflict() {
    let app = setup_app();

    let license = create(
        &app,
        json!({
            "accountNumbers": ["1001", "1001", "1002"],
            "maxAccounts": 4,
            "expiryDate": "2099-12-31",
            "customKey": "MQL5-CUSTOM-0001"
        }),
    )
    .await;
    assert_eq!(license["key"], "MQL5-CUSTOM-0001");
    assert_eq!(license["accountNumbers"], json!(["1001", "1002"]));
    assert_eq!(license["maxAccounts"], 4);
    assert_eq!(license["active"], true);
    assert!(license["expiryDate"]
        .as_str()
        .unwrap()
        .starts_with("2099-12-31T23:59:59"));

    let (status, json) = admin(&app, Method::GET, "/api/licenses/MQL5-CUSTOM-0001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["license"]["id"], license["id"]);

    let (status, json) = admin(&app, Method::GET, "/api/licenses/MQL5-MISSING", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (status, json) = admin(
        &app,
        Method::POST,
        "/api/licenses",
        Some(json!({ "customKey": "MQL5-CUSTOM-0001" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn create_rejects_bad_fields() {
    let app = setup_app();

    let (status, json) = admin(
        &app,
        Method::POST,
        "/api/licenses",
        Some(json!({ "expiryDate": "someday" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["field"], "expiryDate");

    let (status, json) = admin(
        &app,
        Method::POST,
        "/api/licenses",
        Some(json!({ "customKey": "bad key!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["field"], "customKey");

    let (status, _) = admin(
        &app,
        Method::POST,
        "/api/licenses",
        Some(json!({ "accountNumbers": [""] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_by_id_and_clear_expiry() {
    let app = setup_app();
    let license = create(
        &app,
        json!({ "accountNumbers": ["1"], "expiryDate": "2099-01-01" }),
    )
    .await;
    let id = license["id"].as_str().unwrap();

    let (status, json) = admin(
        &app,
        Method::PUT,
        &format!("/api/licenses/{id}"),
        Some(json!({ "accountNumbers": [7, "8"], "maxAccounts": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["license"]["accountNumbers"], json!(["7", "8"]));
    assert_eq!(json["license"]["maxAccounts"], 9);
    assert!(json["license"]["expiryDate"].is_string());

    let (status, json) = admin(
        &app,
        Method::PUT,
        &format!("/api/licenses/{id}"),
        Some(json!({ "expiryDate": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["license"]["expiryDate"].is_null());
    assert_eq!(json["license"]["maxAccounts"], 9);

    let (status, _) = admin(
        &app,
        Method::PUT,
        "/api/licenses/999",
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn toggle_sets_or_flips() {
    let app = setup_app();
    let license = create(&app, json!({})).await;
    let uri = format!("/api/licenses/{}/toggle", license["id"].as_str().unwrap());

    let (status, json) = admin(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["license"]["active"], false);

    let (_, json) = admin(&app, Method::POST, &uri, Some(json!({ "active": false }))).await;
    assert_eq!(json["license"]["active"], false);

    let (_, json) = admin(&app, Method::POST, &uri, Some(json!({ "active": true }))).await;
    assert_eq!(json["license"]["active"], true);

    let (status, _) = admin(&app, Method::POST, "/api/licenses/999/toggle", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn add_account_endpoint() {
    let app = setup_app();
    let license = create(&app, json!({ "accountNumbers": ["1001"] })).await;
    let key = license["key"].as_str().unwrap();

    for _ in 0..2 {
        let (status, json) = admin(
            &app,
            Method::POST,
            "/api/accounts",
            Some(json!({ "licenseKey": key, "accountNumber": 2002 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["license"]["accountNumbers"], json!(["1001", "2002"]));
    }

    let (status, _) = admin(
        &app,
        Method::POST,
        "/api/accounts",
        Some(json!({ "licenseKey": "MQL5-NOPE", "accountNumber": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = validate(&app, key, json!("2002")).await;
    assert_eq!(json["valid"], true);
}

#[tokio::test]
async fn delete_then_not_found() {
    let app = setup_app();
    let license = create(&app, json!({})).await;
    let uri = format!("/api/licenses/{}", license["id"].as_str().unwrap());

    let (status, json) = admin(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, _) = admin(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_and_logs() {
    let app = setup_app();
    let license = create(&app, json!({ "accountNumbers": ["1001"] })).await;
    let key = license["key"].as_str().unwrap();

    validate(&app, key, json!("1001")).await;
    validate(&app, key, json!("1001")).await;
    validate(&app, key, json!("2002")).await;
    validate(&app, "MQL5-OTHER", json!("1001")).await;

    let (status, json) = admin(&app, Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stats"]["totalLicenses"], 1);
    assert_eq!(json["stats"]["totalValidations"], 4);
    assert_eq!(json["stats"]["successfulValidations"], 2);
    assert_eq!(json["stats"]["successRate"], 50.0);

    let (_, json) = admin(&app, Method::GET, "/api/logs?limit=2", None).await;
    let logs = json["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["licenseKey"], "MQL5-OTHER");

    let (_, json) = admin(&app, Method::GET, &format!("/api/logs?licenseKey={key}"), None).await;
    let logs = json["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["errorMessage"], "account not authorized");
    assert_eq!(logs[2]["success"], true);
}

#[tokio::test]
async fn end_to_end_over_http() {
    let app = setup_app();
    let license = create(&app, json!({ "accountNumbers": ["1001"], "maxAccounts": 5 })).await;
    let key = license["key"].as_str().unwrap();
    let id = license["id"].as_str().unwrap();

    let (_, json) = validate(&app, key, json!("1001")).await;
    assert_eq!(json["valid"], true);

    let (_, json) = validate(&app, key, json!("2002")).await;
    assert_eq!(json["valid"], false);
    assert_eq!(json["error"], "ACCOUNT_NOT_AUTHORIZED");
    assert_eq!(json["accountsUsed"], json!(["1001"]));

    admin(
        &app,
        Method::POST,
        &format!("/api/licenses/{id}/toggle"),
        Some(json!({ "active": false })),
    )
    .await;

    let (_, json) = validate(&app, key, json!("1001")).await;
    assert_eq!(json["valid"], false);
    assert_eq!(json["error"], "LICENSE_INACTIVE");
}
