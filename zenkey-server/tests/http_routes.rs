use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{Value, json};
use zenkey_server::routes::{HEALTH, LOGIN, REGISTER};

#[path = "support/mod.rs"]
mod support;
use support::build_test_app;

#[tokio::test]
async fn register_then_login_issues_a_session_token() -> Result<()> {
    let app = build_test_app(|_| {}).await?;

    let response = app
        .server
        .post(REGISTER)
        .json(&json!({"email": "kiosk@example.com", "password": "hunter2"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.assert_json(&json!({"msg": "Account created"}));

    let response = app
        .server
        .post(LOGIN)
        .json(&json!({"identity": "Kiosk@Example.com", "secret": "hunter2"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["msg"], "Login successful");
    assert_eq!(body["role"], "user");
    let token = body["token"].as_str().unwrap_or_default();
    assert_eq!(token.len(), 48);
    assert_eq!(
        app.state.sessions.resolve(token).map(|s| s.identity),
        Some("kiosk@example.com".to_string())
    );

    app.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn duplicate_and_empty_registrations_are_rejected() -> Result<()> {
    let app = build_test_app(|_| {}).await?;

    app.server
        .post(REGISTER)
        .json(&json!({"email": "ops", "password": "pw", "role": "admin"}))
        .await
        .assert_status(StatusCode::CREATED);

    let duplicate = app
        .server
        .post(REGISTER)
        .json(&json!({"email": "OPS", "password": "other"}))
        .await;
    duplicate.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = duplicate.json();
    assert_eq!(body["error"]["status"], 400);
    assert!(
        body["error"]["message"]
            .as_str()
            .is_some_and(|message| message.contains("already exists"))
    );

    app.server
        .post(REGISTER)
        .json(&json!({"email": "blank", "password": ""}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    app.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn login_distinguishes_unknown_identity_from_wrong_secret() -> Result<()> {
    let app = build_test_app(|_| {}).await?;
    app.server
        .post(REGISTER)
        .json(&json!({"email": "ops", "password": "right"}))
        .await
        .assert_status(StatusCode::CREATED);

    let unknown = app
        .server
        .post(LOGIN)
        .json(&json!({"email": "nobody", "password": "right"}))
        .await;
    unknown.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = unknown.json();
    assert_eq!(body["error"]["message"], "Account not found");

    app.server
        .post(LOGIN)
        .json(&json!({"email": "ops", "password": "wrong"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    assert!(app.state.sessions.is_empty());

    app.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn bootstrap_account_logs_in_as_admin() -> Result<()> {
    let app = build_test_app(|config| {
        config.auth.bootstrap_identity = Some("admin".to_string());
        config.auth.bootstrap_secret = Some("changeme".to_string());
    })
    .await?;

    let response = app
        .server
        .post(LOGIN)
        .json(&json!({"email": "admin", "password": "changeme"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["role"], "admin");

    app.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn health_reports_device_and_idle_session() -> Result<()> {
    let app = build_test_app(|_| {}).await?;

    let response = app.server.get(HEALTH).await;
    response.assert_status_ok();
    response.assert_json(&json!({
        "status": "ok",
        "device": {"mounted": false, "path": null},
        "scan": {
            "status": "idle",
            "progress": 0,
            "infectedCount": 0,
            "infectedFiles": [],
            "errorMessage": null
        },
        "connections": 0
    }));

    app.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn health_is_unavailable_after_shutdown() -> Result<()> {
    let app = build_test_app(|_| {}).await?;
    app.shutdown.cancel();

    // The actor drops its command receiver once it observes cancellation.
    let mut status = StatusCode::OK;
    for _ in 0..50 {
        status = app.server.get(HEALTH).await.status_code();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn cors_allows_any_origin_by_default() -> Result<()> {
    let app = build_test_app(|_| {}).await?;

    let response = app
        .server
        .get(HEALTH)
        .add_header("Origin", "http://kiosk.local")
        .await;
    assert_eq!(response.header("access-control-allow-origin"), "*");

    app.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn cors_restricts_to_configured_origins() -> Result<()> {
    let app = build_test_app(|config| {
        config.cors.allowed_origins = vec!["http://kiosk.local".to_string()];
    })
    .await?;

    let allowed = app
        .server
        .get(HEALTH)
        .add_header("Origin", "http://kiosk.local")
        .await;
    assert_eq!(
        allowed.header("access-control-allow-origin"),
        "http://kiosk.local"
    );

    let denied = app
        .server
        .get(HEALTH)
        .add_header("Origin", "http://elsewhere.example")
        .await;
    assert!(
        denied
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );

    app.shutdown.cancel();
    Ok(())
}
