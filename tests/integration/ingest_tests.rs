//! Submission integration tests.
//!
//! Tests verify:
//! - Accepted submissions write the image, the record and the queue message
//! - Decode and validation failures have no side effects
//! - Failures in later stages leave earlier writes in place
//! - Same-second submissions share one object key
//! - Both enqueue failure policies

use std::time::Duration;

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{TimeZone, Utc};

use webcam_api::error::MetadataError;
use webcam_api::EnqueuePolicy;

use super::test_utils::{
    create_test_jpeg, post_json, submission_body, MemoryEventQueue, TestApp, TEST_BUCKET,
    TEST_QUEUE,
};

const EXPECTED_KEY: &str = "image-20240601123045.jpg";

async fn submit(app: &TestApp, body: impl Into<axum::body::Body>) -> (StatusCode, serde_json::Value) {
    let token = app.token("front-door");
    app.send(post_json("/", body, Some(&format!("Bearer {}", token))))
        .await
}

async fn assert_no_side_effects(app: &TestApp) {
    assert_eq!(app.blobs.put_count(), 0);
    assert!(app.records.records().await.is_empty());
    assert!(app.queue.sent().await.is_empty());
}

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_submission_created() {
    let app = TestApp::new();
    let jpeg = create_test_jpeg(32, 24);

    let (status, body) = submit(&app, submission_body(&jpeg, "weather")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, serde_json::json!({"result": "CREATED", "error": ""}));

    // Image stored byte-for-byte under the timestamp key
    let object = app.blobs.object(TEST_BUCKET, EXPECTED_KEY).await.unwrap();
    assert_eq!(object.bytes.as_ref(), jpeg.as_slice());
    assert_eq!(object.content_type, "image/jpeg");
    assert_eq!(&object.bytes[..2], &[0xFF, 0xD8]);

    // One record referencing the same key
    let records = app.records.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].object_key, EXPECTED_KEY);
    assert_eq!(records[0].topic, "weather");
    assert_eq!(records[0].metadata["camera"], "front-door");
    assert_eq!(records[0].metadata["resolution"], "640x480");
    assert!(records[0].created_at.is_none());

    // One delayed message naming the key and bucket
    let sent = app.queue.sent().await;
    assert_eq!(sent.len(), 1);
    let (handle, message) = &sent[0];
    assert_eq!(handle.name, TEST_QUEUE);
    assert_eq!(message.body(), EXPECTED_KEY);
    assert_eq!(message.bucket_name, TEST_BUCKET);
    assert_eq!(message.delay, Duration::from_secs(10));
    assert_eq!(message.attributes()["image_object_key"], EXPECTED_KEY);
    assert_eq!(message.attributes()["bucket_name"], TEST_BUCKET);
}

#[tokio::test]
async fn test_created_at_persisted_verbatim() {
    let app = TestApp::new();
    let body = serde_json::json!({
        "image": STANDARD.encode(create_test_jpeg(8, 8)),
        "topic": "weather",
        "metadata": {"camera": "1"},
        "created_at": "2023-12-31T23:59:59Z",
    });

    let (status, _) = submit(&app, body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED);

    let records = app.records.records().await;
    assert_eq!(
        records[0].created_at,
        Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap())
    );
    // The key still comes from the server clock
    assert_eq!(records[0].object_key, EXPECTED_KEY);
}

#[tokio::test]
async fn test_null_created_at_is_omitted() {
    let app = TestApp::new();
    let body = serde_json::json!({
        "image": STANDARD.encode(create_test_jpeg(8, 8)),
        "topic": "weather",
        "metadata": {"camera": "1"},
        "created_at": null,
    });

    let (status, _) = submit(&app, body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(app.records.records().await[0].created_at.is_none());
}

// =============================================================================
// Object Keys
// =============================================================================

#[tokio::test]
async fn test_same_second_submissions_share_key() {
    let app = TestApp::new();
    let first = create_test_jpeg(8, 8);
    let second = create_test_jpeg(16, 16);

    let (status, _) = submit(&app, submission_body(&first, "first")).await;
    assert_eq!(status, StatusCode::CREATED);
    app.clock.advance(chrono::Duration::milliseconds(500));
    let (status, _) = submit(&app, submission_body(&second, "second")).await;
    assert_eq!(status, StatusCode::CREATED);

    // One object, holding the later image
    assert_eq!(app.blobs.object_count().await, 1);
    assert_eq!(app.blobs.put_count(), 2);
    let object = app.blobs.object(TEST_BUCKET, EXPECTED_KEY).await.unwrap();
    assert_eq!(object.bytes.as_ref(), second.as_slice());

    // Two rows pointing at it
    let records = app.records.records().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.object_key == EXPECTED_KEY));
    assert_eq!(records[0].topic, "first");
    assert_eq!(records[1].topic, "second");
}

#[tokio::test]
async fn test_next_second_gets_new_key() {
    let app = TestApp::new();
    let jpeg = create_test_jpeg(8, 8);

    submit(&app, submission_body(&jpeg, "weather")).await;
    app.clock.advance(chrono::Duration::seconds(1));
    submit(&app, submission_body(&jpeg, "weather")).await;

    assert_eq!(app.blobs.object_count().await, 2);
    assert!(app
        .blobs
        .object(TEST_BUCKET, "image-20240601123046.jpg")
        .await
        .is_some());
}

// =============================================================================
// Decode and Validation Failures
// =============================================================================

#[tokio::test]
async fn test_empty_body_rejected() {
    let app = TestApp::new();

    let (status, body) = submit(&app, "").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Request body must not be empty");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_truncated_body_differs_from_empty() {
    let app = TestApp::new();

    let (status, body) = submit(&app, r#"{"image":"AA==","topic":"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Request body contains badly-formed JSON");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_syntax_error_reports_position() {
    let app = TestApp::new();

    let (status, body) = submit(&app, r#"{"image" "AA=="}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Request body contains badly-formed JSON (at line 1, column"));
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_unknown_field_named() {
    let app = TestApp::new();
    let body = serde_json::json!({
        "image": "AA==",
        "topic": "weather",
        "metadata": {"camera": "1"},
        "location": "porch",
    });

    let (status, json) = submit(&app, body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "Request body contains unknown field \"location\""
    );
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_non_string_metadata_rejected() {
    let app = TestApp::new();
    let body = r#"{"image":"AA==","topic":"weather","metadata":{"count":3}}"#;

    let (status, json) = submit(&app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Request body contains an invalid value"));
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_array_body_rejected() {
    let app = TestApp::new();
    let image = STANDARD.encode(create_test_jpeg(8, 8));

    for body in [
        format!(r#"["{}","weather",{{"cam":"1"}}]"#, image),
        "[]".to_string(),
    ] {
        let (status, json) = submit(&app, body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Request body contains an invalid value"));
    }
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_each_required_field_validated() {
    let cases = [
        (
            r#"{"topic":"weather","metadata":{"k":"v"}}"#,
            "image field is required",
        ),
        (
            r#"{"image":"AA==","topic":"","metadata":{"k":"v"}}"#,
            "topic field is required",
        ),
        (
            r#"{"image":"AA==","topic":"weather","metadata":{}}"#,
            "metadata field is required",
        ),
        (
            r#"{"image":"AA==","topic":"weather"}"#,
            "metadata field is required",
        ),
        // Reported in field order
        (r#"{}"#, "image field is required"),
    ];

    for (body, expected) in cases {
        let app = TestApp::new();
        let (status, json) = submit(&app, body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(json["error"], expected, "body: {}", body);
        assert_eq!(json["result"], "");
        assert_no_side_effects(&app).await;
    }
}

#[tokio::test]
async fn test_invalid_base64_rejected() {
    let app = TestApp::new();
    let body = r#"{"image":"%%% not base64 %%%","topic":"weather","metadata":{"k":"v"}}"#;

    let (status, json) = submit(&app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("image field must be valid base64"));
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = TestApp::builder().max_body_bytes(1024).build();
    let jpeg = vec![0xAB; 4096];

    let (status, json) = submit(&app, submission_body(&jpeg, "weather")).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"], "Request body must not be larger than 1KB");
    assert_no_side_effects(&app).await;
}

// =============================================================================
// Upstream Failures
// =============================================================================

#[tokio::test]
async fn test_upload_failure_stops_pipeline() {
    let app = TestApp::new();
    app.blobs.fail_with("AccessDenied");

    let (status, body) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to upload image");
    assert!(app.records.records().await.is_empty());
    assert!(app.queue.sent().await.is_empty());
}

#[tokio::test]
async fn test_upload_timeout_surfaces_as_upload_error() {
    let app = TestApp::builder()
        .upstream_timeout(Duration::from_millis(50))
        .build();
    app.blobs.stall_for(Duration::from_secs(30));

    let (status, body) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to upload image");
    assert_eq!(app.blobs.object_count().await, 0);
    assert!(app.records.records().await.is_empty());
}

#[tokio::test]
async fn test_insert_timeout_surfaces_as_persist_error() {
    let app = TestApp::builder()
        .upstream_timeout(Duration::from_millis(50))
        .build();
    app.records.stall_for(Duration::from_secs(30));

    let (status, body) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("insert timed out"));
    assert_eq!(app.blobs.object_count().await, 1);
    assert!(app.records.records().await.is_empty());
    assert!(app.queue.sent().await.is_empty());
}

#[tokio::test]
async fn test_enqueue_timeout_fails_request_under_fail_policy() {
    let app = TestApp::builder()
        .upstream_timeout(Duration::from_millis(50))
        .enqueue_policy(EnqueuePolicy::FailRequest)
        .build();
    app.queue.stall_for(Duration::from_secs(30));

    let (status, body) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal Server Error");
    assert_eq!(app.records.records().await.len(), 1);
    assert!(app.queue.sent().await.is_empty());
}

#[tokio::test]
async fn test_metadata_failure_leaves_orphaned_image() {
    let app = TestApp::new();
    app.records
        .fail_with(MetadataError::Connection("connection refused".to_string()));
    let jpeg = create_test_jpeg(8, 8);

    let (status, body) = submit(&app, submission_body(&jpeg, "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "unable to connect to DB: connection refused");

    // The uploaded image is not rolled back
    let object = app.blobs.object(TEST_BUCKET, EXPECTED_KEY).await.unwrap();
    assert_eq!(object.bytes.as_ref(), jpeg.as_slice());
    assert!(app.records.records().await.is_empty());
    assert!(app.queue.sent().await.is_empty());
}

#[tokio::test]
async fn test_enqueue_failure_logged_and_accepted() {
    let app = TestApp::new();
    app.queue.fail_sends_with("service unavailable");

    let (status, body) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["result"], "CREATED");
    assert_eq!(app.blobs.object_count().await, 1);
    assert_eq!(app.records.records().await.len(), 1);
    assert!(app.queue.sent().await.is_empty());
}

#[tokio::test]
async fn test_enqueue_failure_fails_request_under_fail_policy() {
    let app = TestApp::builder()
        .enqueue_policy(EnqueuePolicy::FailRequest)
        .build();
    app.queue.fail_sends_with("service unavailable");

    let (status, body) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal Server Error");

    // Nothing is rolled back
    assert_eq!(app.blobs.object_count().await, 1);
    assert_eq!(app.records.records().await.len(), 1);
}

#[tokio::test]
async fn test_unresolvable_queue_fails_request_under_fail_policy() {
    let app = TestApp::builder()
        .queue(MemoryEventQueue::new("some-other-queue"))
        .enqueue_policy(EnqueuePolicy::FailRequest)
        .build();

    let (status, _) = submit(&app, submission_body(&create_test_jpeg(8, 8), "weather")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.records.records().await.len(), 1);
}
