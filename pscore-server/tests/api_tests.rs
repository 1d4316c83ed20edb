//! Integration tests for pscore-server HTTP endpoints
//!
//! Tests cover:
//! - Health endpoint (no identity required)
//! - Identity header handling
//! - Score reads, adjustments and group adjustments
//! - Stage weights and reconciliation
//! - Appeal submission with attachments, signed downloads and resolution
//! - Error body shape and status mapping

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{Fixture, TEST_BASE_URL};
use pscore_server::build_router;
use pscore_server::collaborators::USER_ID_HEADER;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method
use uuid::Uuid;

/// Test helper: Send one request through a fresh router
async fn send(fx: &Fixture, request: Request<Body>) -> (StatusCode, Value) {
    let app = build_router(fx.state.clone());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// =============================================================================
// Health and identity
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_needs_no_identity() {
    let fx = Fixture::new().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "pscore-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo() {
    let fx = Fixture::new().await;
    let request = Request::builder().uri("/api/buildinfo").body(Body::empty()).unwrap();

    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
}

#[tokio::test]
async fn test_missing_identity_is_unauthenticated() {
    let fx = Fixture::new().await;
    let uri = format!("/api/groups/{}/task-scores", fx.group_id);
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

// =============================================================================
// Scores and adjustments
// =============================================================================

#[tokio::test]
async fn test_reconcile_then_read_scores() {
    let fx = Fixture::new().await;
    let members = fx.add_members(2).await;
    let stage = fx.add_stage("Design", 1).await;
    fx.add_task(Some(stage), &members).await;

    let uri = format!("/api/groups/{}/reconcile", fx.group_id);
    let (status, report) = send(&fx, json_request("POST", &uri, fx.leader, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["task_scores_created"], 2);
    assert_eq!(report["failures"], json!([]));

    let uri = format!("/api/groups/{}/task-scores?user_id={}", fx.group_id, members[0]);
    let (status, body) = send(&fx, get(&uri, members[0])).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["base_score"], 100.0);
    assert_eq!(rows[0]["final_score"], 100.0);

    let uri = format!("/api/groups/{}/stage-scores?stage_id={}", fx.group_id, stage);
    let (_, body) = send(&fx, get(&uri, fx.leader)).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let uri = format!("/api/groups/{}/final-scores", fx.group_id);
    let (_, body) = send(&fx, get(&uri, fx.leader)).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_adjustment_endpoint() {
    let fx = Fixture::new().await;
    let member = fx.add_member().await;
    let task = fx.add_task(None, &[member]).await;

    let request = json_request(
        "POST",
        "/api/adjustments",
        fx.leader,
        json!({"tier": "task", "entity_id": task, "user_id": member, "delta": -10, "reason": "late"}),
    );
    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["previous_score"], 100.0);
    assert_eq!(body["score"]["final_score"], 90.0);
    assert_eq!(body["score"]["adjustment_reason"], "late");

    // Same row by id
    let score_id = body["score"]["id"].as_str().unwrap().to_string();
    let request = json_request(
        "POST",
        "/api/adjustments",
        fx.leader,
        json!({"tier": "task", "score_id": score_id, "delta": 4, "reason": "resubmitted"}),
    );
    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"]["adjustment"], -6.0);

    let uri = format!("/api/scores/task/{}", score_id);
    let (status, body) = send(&fx, get(&uri, member)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["final_score"], 94.0);

    let uri = format!("/api/groups/{}/history?tier=task&user_id={}", fx.group_id, member);
    let (status, body) = send(&fx, get(&uri, fx.leader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["total_pages"], 1);
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_adjustment_error_statuses() {
    let fx = Fixture::new().await;
    let member = fx.add_member().await;
    let task = fx.add_task(None, &[member]).await;

    let blank_reason = json!({"tier": "task", "entity_id": task, "user_id": member, "delta": -1, "reason": ""});
    let (status, body) = send(&fx, json_request("POST", "/api/adjustments", fx.leader, blank_reason.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"].is_string());

    let (status, body) = send(&fx, json_request("POST", "/api/adjustments", member, json!({
        "tier": "task", "entity_id": task, "user_id": member, "delta": 5, "reason": "mine"
    })))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(&fx, json_request("POST", "/api/adjustments", fx.leader, json!({
        "tier": "task", "entity_id": Uuid::new_v4(), "user_id": member, "delta": 5, "reason": "x"
    })))
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    assert_eq!(fx.history_count().await, 0);
}

#[tokio::test]
async fn test_group_adjustment_endpoint() {
    let fx = Fixture::new().await;
    let members = fx.add_members(4).await;
    let task = fx.add_task(None, &members).await;

    let uri = format!("/api/tasks/{}/group-adjustment", task);
    let (status, body) = send(
        &fx,
        json_request("POST", &uri, fx.leader, json!({"delta": -10, "reason": "late"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let outcomes = body["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o["score"]["final_score"] == 90.0));
    assert!(body["reconcile"].is_object());

    let (status, body) = send(
        &fx,
        json_request(
            "POST",
            &uri,
            fx.leader,
            json!({"members": [
                {"user_id": members[0], "delta": 10, "reason": "fixed it"},
                {"user_id": members[1], "delta": 3}
            ]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcomes"][0]["score"]["final_score"], 100.0);
    assert_eq!(body["outcomes"][1]["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(fx.history_count().await, 5);
}

// =============================================================================
// Weights
// =============================================================================

#[tokio::test]
async fn test_weight_endpoints() {
    let fx = Fixture::new().await;
    let stage = fx.add_stage("Review", 1).await;
    let uri = format!("/api/stages/{}/weight", stage);

    let (status, body) = send(&fx, json_request("PUT", &uri, fx.leader, json!({"weight": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(&fx, json_request("PUT", &uri, fx.leader, json!({"weight": 2.5}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["weight"], 2.5);

    let list_uri = format!("/api/groups/{}/weights", fx.group_id);
    let (_, body) = send(&fx, get(&list_uri, fx.leader)).await;
    assert_eq!(body[0]["weight"], 2.5);

    let request = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .header(USER_ID_HEADER, fx.leader.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["weight"], 1.0);

    let (_, body) = send(&fx, get(&list_uri, fx.leader)).await;
    assert_eq!(body, json!([]));
}

// =============================================================================
// Appeals
// =============================================================================

#[tokio::test]
async fn test_appeal_flow_over_http() {
    let fx = Fixture::new().await;
    let member = fx.add_member().await;
    fx.add_task(None, &[member]).await;
    fx.state.reconciler.reconcile(fx.group_id).await.unwrap();

    let uri = format!("/api/groups/{}/task-scores?user_id={}", fx.group_id, member);
    let (_, rows) = send(&fx, get(&uri, member)).await;
    let score_id = rows[0]["id"].as_str().unwrap().to_string();

    let content = b"screenshot bytes";
    let (status, appeal) = send(
        &fx,
        json_request(
            "POST",
            "/api/appeals",
            member,
            json!({
                "tier": "task",
                "target_id": score_id,
                "content": "The deadline was extended",
                "attachments": [{
                    "file_name": "../../evidence.png",
                    "content_type": "image/png",
                    "data": STANDARD.encode(content)
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", appeal);
    assert_eq!(appeal["status"], "pending");
    assert_eq!(appeal["target"]["tier"], "task");
    let appeal_id = appeal["id"].as_str().unwrap().to_string();

    let (status, details) = send(&fx, get(&format!("/api/appeals/{}", appeal_id), member)).await;
    assert_eq!(status, StatusCode::OK);
    let url = details["attachments"][0]["url"].as_str().unwrap();
    // Separators in the client's file name never become directories
    let stored_path = details["attachments"][0]["file_path"].as_str().unwrap();
    assert_eq!(stored_path.split('/').count(), 3, "path: {}", stored_path);
    assert!(stored_path.ends_with("evidence.png"));

    // Signed link works without an identity header
    let path = url.strip_prefix(TEST_BASE_URL).unwrap();
    let app = build_router(fx.state.clone());
    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], content);

    let (_, own) = send(&fx, get("/api/users/me/appeals", member)).await;
    assert_eq!(own.as_array().unwrap().len(), 1);

    let resolve_uri = format!("/api/appeals/{}/resolve", appeal_id);
    let (status, body) = send(
        &fx,
        json_request("POST", &resolve_uri, member, json!({"approve": true, "response": "yes"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "body: {}", body);

    let (status, body) = send(
        &fx,
        json_request("POST", &resolve_uri, fx.leader, json!({"approve": false, "response": "Extension did not apply"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let (status, body) = send(
        &fx,
        json_request("POST", &resolve_uri, fx.leader, json!({"approve": true, "response": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");

    let list_uri = format!("/api/groups/{}/appeals?status=rejected", fx.group_id);
    let (status, body) = send(&fx, get(&list_uri, fx.leader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_appeal_rejects_invalid_base64() {
    let fx = Fixture::new().await;
    let member = fx.add_member().await;
    let request = json_request(
        "POST",
        "/api/appeals",
        member,
        json!({
            "tier": "task",
            "target_id": Uuid::new_v4(),
            "content": "x",
            "attachments": [{"file_name": "a.txt", "data": "%%% not base64 %%%"}]
        }),
    );

    let (status, body) = send(&fx, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
