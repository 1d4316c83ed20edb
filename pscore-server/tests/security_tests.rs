//! Security tests for pscore-server
//!
//! Tests security-critical features:
//! - 10MB request body limit
//! - Identity header validation
//! - Attachment link signatures, expiry and path traversal

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{Fixture, TEST_SECRET};
use pscore_common::signing;
use pscore_server::build_router;
use pscore_server::collaborators::USER_ID_HEADER;
use pscore_server::MAX_REQUEST_BODY_BYTES;
use tower::util::ServiceExt;

// =============================================================================
// Body Size Limit Tests
// =============================================================================

/// Bodies over 10MB are rejected before reaching the handler
#[tokio::test]
async fn test_body_size_limit_10mb() {
    let fx = Fixture::new().await;
    let app = build_router(fx.state.clone());

    let large_body = vec![b'x'; MAX_REQUEST_BODY_BYTES + 1024];
    let request = Request::builder()
        .method("POST")
        .uri("/api/appeals")
        .header("Content-Type", "application/json")
        .header(USER_ID_HEADER, fx.leader.to_string())
        .body(Body::from(large_body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

/// Bodies under the limit are not rejected for size
#[tokio::test]
async fn test_body_size_under_limit() {
    let fx = Fixture::new().await;
    let app = build_router(fx.state.clone());

    // Valid JSON of about 1MB that fails deserialization, not the size check
    let json_body = format!(r#"{{"padding": "{}"}}"#, "a".repeat(1024 * 1024));
    let request = Request::builder()
        .method("POST")
        .uri("/api/appeals")
        .header("Content-Type", "application/json")
        .header(USER_ID_HEADER, fx.leader.to_string())
        .body(Body::from(json_body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_ne!(
        response.status(),
        StatusCode::PAYLOAD_TOO_LARGE,
        "Body under 10MB should not be rejected for size"
    );
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn test_malformed_identity_header_is_rejected() {
    let fx = Fixture::new().await;
    let app = build_router(fx.state.clone());

    let request = Request::builder()
        .uri("/api/users/me/appeals")
        .header(USER_ID_HEADER, "not-a-uuid")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Attachment links
// =============================================================================

async fn download_status(fx: &Fixture, uri: &str) -> StatusCode {
    let app = build_router(fx.state.clone());
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_attachment_link_requires_valid_signature() {
    let fx = Fixture::new().await;
    let path = "appeals/0000/file.txt";
    let expires = chrono::Utc::now().timestamp() + 60;

    let forged = format!("/attachments/{}?expires={}&signature={}", path, expires, "0".repeat(64));
    assert_eq!(download_status(&fx, &forged).await, StatusCode::FORBIDDEN);

    let missing_query = format!("/attachments/{}", path);
    assert_eq!(download_status(&fx, &missing_query).await, StatusCode::BAD_REQUEST);

    // Valid signature for a file that was never stored
    let signature = signing::sign(TEST_SECRET, path, expires);
    let valid = format!("/attachments/{}?expires={}&signature={}", path, expires, signature);
    assert_eq!(download_status(&fx, &valid).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_attachment_link_is_rejected() {
    let fx = Fixture::new().await;
    let path = "appeals/0000/file.txt";
    let expires = chrono::Utc::now().timestamp() - 1;
    let signature = signing::sign(TEST_SECRET, path, expires);

    let uri = format!("/attachments/{}?expires={}&signature={}", path, expires, signature);
    assert_eq!(download_status(&fx, &uri).await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_attachment_path_traversal_is_rejected() {
    let fx = Fixture::new().await;
    let path = "appeals/../../pscore.db";
    let expires = chrono::Utc::now().timestamp() + 60;
    let signature = signing::sign(TEST_SECRET, path, expires);

    let uri = format!(
        "/attachments/appeals/%2E%2E/%2E%2E/pscore.db?expires={}&signature={}",
        expires, signature
    );
    let status = download_status(&fx, &uri).await;
    assert!(
        status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND,
        "traversal must not be served, got {}",
        status
    );
}
