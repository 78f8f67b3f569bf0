//! Authentication integration tests.
//!
//! Tests verify:
//! - Valid tokens are accepted raw or with the `Bearer` scheme
//! - Missing, malformed, tampered, foreign and expired tokens get 401
//! - Rejected requests never reach the stores

use axum::http::StatusCode;
use chrono::{Duration, Utc};

use webcam_api::TokenService;

use super::test_utils::{create_test_jpeg, post_json, submission_body, TestApp};

async fn assert_rejected(app: &TestApp, authorization: Option<&str>) {
    let body = submission_body(&create_test_jpeg(8, 8), "weather");
    let (status, json) = app.send(post_json("/", body, authorization)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["result"], "");
    assert_eq!(json["error"], "Unauthorized");

    // Nothing may have been written
    assert_eq!(app.blobs.put_count(), 0);
    assert!(app.records.records().await.is_empty());
    assert!(app.queue.sent().await.is_empty());
}

// =============================================================================
// Accepted Tokens
// =============================================================================

#[tokio::test]
async fn test_raw_token_accepted() {
    let app = TestApp::new();
    let token = app.token("front-door");
    let body = submission_body(&create_test_jpeg(8, 8), "weather");

    let (status, _) = app.send(post_json("/", body, Some(&token))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let app = TestApp::new();
    let token = app.token("front-door");
    let body = submission_body(&create_test_jpeg(8, 8), "weather");

    let (status, _) = app
        .send(post_json("/", body, Some(&format!("Bearer {}", token))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

// =============================================================================
// Rejected Tokens
// =============================================================================

#[tokio::test]
async fn test_missing_token_rejected() {
    let app = TestApp::new();
    assert_rejected(&app, None).await;
}

#[tokio::test]
async fn test_empty_bearer_rejected() {
    let app = TestApp::new();
    assert_rejected(&app, Some("Bearer ")).await;
}

#[tokio::test]
async fn test_malformed_token_rejected() {
    let app = TestApp::new();
    assert_rejected(&app, Some("not-a-token")).await;
}

#[tokio::test]
async fn test_tampered_token_rejected() {
    let app = TestApp::new();
    let token = app.token("front-door");

    // Flip the first signature character
    let (rest, signature) = token.rsplit_once('.').unwrap();
    let first = if signature.starts_with('A') { 'B' } else { 'A' };
    let tampered = format!("{}.{}{}", rest, first, &signature[1..]);

    assert_rejected(&app, Some(&tampered)).await;
}

#[tokio::test]
async fn test_token_from_other_secret_rejected() {
    let app = TestApp::new();
    let foreign = TokenService::new("some-other-secret").issue("front-door");

    assert_rejected(&app, Some(&foreign)).await;
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = TestApp::new();
    let issued = Utc::now() - Duration::hours(25);
    let expired = app.tokens.issue_at("front-door", issued);

    assert_rejected(&app, Some(&format!("Bearer {}", expired))).await;
}

// =============================================================================
// Public Routes
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_route_returns_envelope() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .uri("/does-not-exist")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found: /does-not-exist");
}
