//! Integration tests for registration, login, MFA enrollment and the
//! login audit trail.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use spellcheckd::config::Config;
use spellcheckd::services::SpellChecker;
use std::sync::Arc;
use tower::ServiceExt;
use totp_rs::{Algorithm, Secret, TOTP};

struct StubChecker;

#[async_trait]
impl SpellChecker for StubChecker {
    async fn check(&self, _text: &str) -> anyhow::Result<Vec<String>> {
        Ok(vec![])
    }
}

const ADMIN_PASSWORD: &str = "Admin1pass";

async fn spawn_app_with_state() -> (Arc<spellcheckd::api::AppState>, Router) {
    let db_path =
        std::env::temp_dir().join(format!("spellcheckd-auth-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.server.secure_cookies = false;
    config.admin.password = ADMIN_PASSWORD.to_string();

    let state = spellcheckd::api::create_app_state_with_checker(config, Arc::new(StubChecker))
        .await
        .expect("failed to create app state");
    let app = spellcheckd::api::router(state.clone()).await;
    (state, app)
}

async fn spawn_app() -> Router {
    spawn_app_with_state().await.1
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
    cookie: Option<&str>,
) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("missing set-cookie header")
        .to_str()
        .unwrap();
    set_cookie
        .split(';')
        .next()
        .expect("empty set-cookie header")
        .to_string()
}

async fn body_json(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn register(app: &Router, username: &str, password: &str) {
    let response = post_json(
        app,
        "/register",
        serde_json::json!({ "username": username, "password": password }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn login(app: &Router, username: &str, password: &str, code: Option<&str>) -> String {
    let mut payload = serde_json::json!({ "username": username, "password": password });
    if let Some(code) = code {
        payload["code"] = serde_json::json!(code);
    }
    let response = post_json(app, "/login", payload, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

fn totp_code(secret: &str) -> String {
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret.to_string()).to_bytes().unwrap(),
        Some("spellcheckd".to_string()),
        "test".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

#[tokio::test]
async fn test_register_login_logout_flow() {
    let app = spawn_app().await;

    let response = post_json(
        &app,
        "/register",
        serde_json::json!({ "username": "alice", "password": "Passw0rd!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["message"], "Registration success.");

    // Same username again: conflict, generic message.
    let response = post_json(
        &app,
        "/register",
        serde_json::json!({ "username": "alice", "password": "Other0pass!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Username is not available.");

    // Wrong password: generic 401, no session cookie issued.
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "alice", "password": "WrongPass1!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid credentials.");

    // Unknown user renders the same message as a wrong password.
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "nobody99", "password": "WrongPass1!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid credentials.");

    let cookie = login(&app, "alice", "Passw0rd!", None).await;

    let response = get(&app, "/account", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["mfa_registered"], false);
    assert_eq!(body["data"]["is_admin"], false);

    let response = get(&app, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // The old cookie no longer resolves to a user.
    let response = get(&app, "/account", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn test_registration_validation() {
    let app = spawn_app().await;

    // Too-short username.
    let response = post_json(
        &app,
        "/register",
        serde_json::json!({ "username": "bob", "password": "Passw0rd!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Disallowed character in username.
    let response = post_json(
        &app,
        "/register",
        serde_json::json!({ "username": "bad-name", "password": "Passw0rd!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Too-short password.
    let response = post_json(
        &app,
        "/register",
        serde_json::json!({ "username": "goodname", "password": "short1!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_redirect_anonymous() {
    let app = spawn_app().await;

    for uri in [
        "/account",
        "/multifactor",
        "/qrcode",
        "/login_history",
        "/spell_check",
        "/history",
        "/history/query/1",
    ] {
        let response = get(&app, uri, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "uri: {uri}");
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }
}

#[tokio::test]
async fn test_mfa_enroll_and_login() {
    let app = spawn_app().await;

    register(&app, "bob_h", "Passw0rd!").await;
    let cookie = login(&app, "bob_h", "Passw0rd!", None).await;

    // Enabling MFA parks the user in pending setup.
    let response = post_json(
        &app,
        "/account",
        serde_json::json!({ "mfa_enabled": true }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["mfa_setup_required"], true);

    // Pending: flag is still down until confirmed.
    let response = get(&app, "/account", Some(&cookie)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["mfa_registered"], false);

    let response = get(&app, "/multifactor", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let secret = body["data"]["secret"].as_str().unwrap().to_string();
    let uri = body["data"]["provisioning_uri"].as_str().unwrap();
    assert!(uri.starts_with("otpauth://totp/"));
    assert!(uri.contains("issuer=spellcheckd"));

    // QR only exists while setup is pending.
    let response = get(&app, "/qrcode", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

    let response = post_json(
        &app,
        "/multifactor",
        serde_json::json!({ "confirm": true }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["enrolled"], true);

    // Once enrolled the provisioning material is gone.
    let response = get(&app, "/qrcode", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = get(&app, "/multifactor", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/account");

    let response = get(&app, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Correct password, no code.
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "bob_h", "password": "Passw0rd!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Two-factor authentication failure.");

    // Correct password, wrong code.
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "bob_h", "password": "Passw0rd!", "code": "000000" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct password and code; non-digit noise in the code is stripped.
    let code = totp_code(&secret);
    let noisy_code = format!("{} {}", &code[..3], &code[3..]);
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "bob_h", "password": "Passw0rd!", "code": noisy_code }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["message"], "Login success.");
}

#[tokio::test]
async fn test_mfa_decline_discards_pending_setup() {
    let app = spawn_app().await;

    register(&app, "carol", "Passw0rd!").await;
    let cookie = login(&app, "carol", "Passw0rd!", None).await;

    let response = post_json(
        &app,
        "/account",
        serde_json::json!({ "mfa_enabled": true }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/multifactor",
        serde_json::json!({ "confirm": false }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["enrolled"], false);

    // Nothing pending anymore: back to the account page.
    let response = get(&app, "/multifactor", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Declining never set the flag, and a plain password login still works.
    let response = get(&app, "/account", Some(&cookie)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["mfa_registered"], false);
}

#[tokio::test]
async fn test_mfa_disable_invalidates_old_secret() {
    let app = spawn_app().await;

    register(&app, "dave_", "Passw0rd!").await;
    let cookie = login(&app, "dave_", "Passw0rd!", None).await;

    post_json(
        &app,
        "/account",
        serde_json::json!({ "mfa_enabled": true }),
        Some(&cookie),
    )
    .await;
    let response = get(&app, "/multifactor", Some(&cookie)).await;
    let body = body_json(response).await;
    let first_secret = body["data"]["secret"].as_str().unwrap().to_string();
    post_json(
        &app,
        "/multifactor",
        serde_json::json!({ "confirm": true }),
        Some(&cookie),
    )
    .await;

    let response = post_json(
        &app,
        "/account",
        serde_json::json!({ "mfa_enabled": false }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["mfa_disabled"], true);

    // Disable lands the user fully unenrolled: flag down, and a plain
    // password login works again.
    let response = get(&app, "/account", Some(&cookie)).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["mfa_registered"], false);
    login(&app, "dave_", "Passw0rd!", None).await;

    // Re-enable: a fresh secret, never the old one.
    post_json(
        &app,
        "/account",
        serde_json::json!({ "mfa_enabled": true }),
        Some(&cookie),
    )
    .await;
    let response = get(&app, "/multifactor", Some(&cookie)).await;
    let body = body_json(response).await;
    let second_secret = body["data"]["secret"].as_str().unwrap();
    assert_ne!(first_secret, second_secret);
}

#[tokio::test]
async fn test_corrupt_mfa_state_fails_loudly_at_login() {
    let (state, app) = spawn_app_with_state().await;

    register(&app, "mallory", "Passw0rd!").await;

    // Flag up with no credential row: the broken combination must never be
    // reported as a wrong or missing code.
    state
        .store()
        .set_mfa_registered("mallory", true)
        .await
        .unwrap();

    // Correct password, no code.
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "mallory", "password": "Passw0rd!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Corrupt state, contact site admin.");

    // Correct password, well-formed code: same outcome.
    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "mallory", "password": "Passw0rd!", "code": "123456" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Corrupt state, contact site admin.");
}

#[tokio::test]
async fn test_password_change() {
    let app = spawn_app().await;

    register(&app, "erin_", "Passw0rd!").await;
    let cookie = login(&app, "erin_", "Passw0rd!", None).await;

    let response = post_json(
        &app,
        "/account",
        serde_json::json!({ "new_password": "Fresh1pass!" }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["password_changed"], true);

    let response = get(&app, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = post_json(
        &app,
        "/login",
        serde_json::json!({ "username": "erin_", "password": "Passw0rd!" }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, "erin_", "Fresh1pass!", None).await;
}

#[tokio::test]
async fn test_login_history_is_admin_only() {
    let app = spawn_app().await;

    register(&app, "frank", "Passw0rd!").await;
    let cookie = login(&app, "frank", "Passw0rd!", None).await;

    // Hard denial, not a redirect.
    let response = get(&app, "/login_history", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json(
        &app,
        "/login_history",
        serde_json::json!({ "user_id": 1 }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin_cookie = login(&app, "admin", ADMIN_PASSWORD, None).await;
    let response = get(&app, "/login_history", Some(&admin_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_audit_record_lifecycle() {
    let app = spawn_app().await;

    // Bootstrap admin is user id 1; the first registration gets id 2.
    register(&app, "grace", "Passw0rd!").await;
    let cookie = login(&app, "grace", "Passw0rd!", None).await;

    let admin_cookie = login(&app, "admin", ADMIN_PASSWORD, None).await;

    let response = post_json(
        &app,
        "/login_history",
        serde_json::json!({ "user_id": 2 }),
        Some(&admin_cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["username"], "grace");
    assert!(entries[0]["login_time"].as_str().is_some());
    assert!(entries[0]["logout_time"].is_null());

    let response = get(&app, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = post_json(
        &app,
        "/login_history",
        serde_json::json!({ "user_id": 2 }),
        Some(&admin_cookie),
    )
    .await;
    let body = body_json(response).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0]["logout_time"].as_str().is_some());

    // Unknown user id.
    let response = post_json(
        &app,
        "/login_history",
        serde_json::json!({ "user_id": 9999 }),
        Some(&admin_cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "User does not exist.");
}

#[tokio::test]
async fn test_logout_closes_only_its_own_audit_record() {
    let app = spawn_app().await;

    // Two concurrent sessions for the same user, one audit row each.
    register(&app, "iris_", "Passw0rd!").await;
    let first_cookie = login(&app, "iris_", "Passw0rd!", None).await;
    let second_cookie = login(&app, "iris_", "Passw0rd!", None).await;

    let admin_cookie = login(&app, "admin", ADMIN_PASSWORD, None).await;
    let response = post_json(
        &app,
        "/login_history",
        serde_json::json!({ "user_id": 2 }),
        Some(&admin_cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["logout_time"].is_null());
    assert!(entries[1]["logout_time"].is_null());

    let response = get(&app, "/logout", Some(&first_cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Only the first session's record is closed; the other stays open.
    let response = post_json(
        &app,
        "/login_history",
        serde_json::json!({ "user_id": 2 }),
        Some(&admin_cookie),
    )
    .await;
    let body = body_json(response).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["logout_time"].as_str().is_some());
    assert!(entries[1]["logout_time"].is_null());

    // And the second session itself is still live.
    let response = get(&app, "/account", Some(&second_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = spawn_app().await;

    let response = get(&app, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-security-policy"], "default-src 'self'");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert!(!headers.contains_key(header::CACHE_CONTROL));

    // Even the anonymous redirect off /account is header-hardened and
    // cache-disabled.
    let response = get(&app, "/account", None).await;
    let headers = response.headers();
    assert_eq!(headers["content-security-policy"], "default-src 'self'");
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");
}

#[tokio::test]
async fn test_logged_in_user_bounced_off_anonymous_pages() {
    let app = spawn_app().await;

    register(&app, "henry", "Passw0rd!").await;
    let cookie = login(&app, "henry", "Passw0rd!", None).await;

    for uri in ["/register", "/login"] {
        let response = get(&app, uri, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "uri: {uri}");
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    let response = post_json(
        &app,
        "/register",
        serde_json::json!({ "username": "henry2", "password": "Passw0rd!" }),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}
