//! HTTP API integration tests: drive the real axum router with in-memory
//! collaborators (SPEC_FULL.md §6.3) instead of a live Postgres connection.

use std::collections::HashSet;
use std::sync::Arc;

use http_body_util::BodyExt;
use tower::ServiceExt;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};

use validator_api::auth::AuthState;
use validator_api::{router, AppState};
use validator_core::security::HealthChecker;
use validator_core::{ChainId, Receipt, TableId};
use validator_sql::Validator;
use validator_storage::{InMemoryQueryStore, InMemoryReceiptStore, ReceiptStore};

fn test_validator() -> Arc<Validator> {
    let types: HashSet<String> = ["int8".to_string(), "text".to_string()].into_iter().collect();
    Arc::new(Validator::new("system_", types))
}

fn state_with(store: InMemoryQueryStore, receipts: InMemoryReceiptStore, auth: AuthState) -> AppState {
    AppState {
        validator: test_validator(),
        store: Arc::new(store),
        receipts: Arc::new(receipts),
        health: Arc::new(HealthChecker::new()),
        auth,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_reports_ok_with_no_tracked_chains() {
    let state = state_with(InMemoryQueryStore::new(), InMemoryReceiptStore::new(), AuthState::disabled());
    let app = router(state);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn query_runs_a_validated_select_against_the_store() {
    let mut row = serde_json::Map::new();
    row.insert("id".to_string(), serde_json::json!(1));
    let store = InMemoryQueryStore::new().with_rows("SELECT * FROM widgets", vec![row]);
    let state = state_with(store, InMemoryReceiptStore::new(), AuthState::disabled());
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "sql": "SELECT * FROM widgets" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["rows"][0]["id"], 1);
}

#[tokio::test]
async fn query_rejects_a_write_statement_with_bad_request() {
    let state = state_with(InMemoryQueryStore::new(), InMemoryReceiptStore::new(), AuthState::disabled());
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "sql": "INSERT INTO widgets (id) VALUES (1)" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_rejects_a_system_table_reference() {
    let state = state_with(InMemoryQueryStore::new(), InMemoryReceiptStore::new(), AuthState::disabled());
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "sql": "SELECT * FROM system_acl" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_requires_a_bearer_token_when_auth_is_configured() {
    let auth = AuthState::new(["secret-token".to_string()]);
    let state = state_with(InMemoryQueryStore::new(), InMemoryReceiptStore::new(), auth);
    let app = router(state);

    let unauthenticated = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "sql": "SELECT 1" }).to_string()))
        .unwrap();

    let response = app.clone().oneshot(unauthenticated).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authenticated = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer secret-token")
        .body(Body::from(serde_json::json!({ "sql": "SELECT 1" }).to_string()))
        .unwrap();

    let response = app.oneshot(authenticated).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn receipt_route_returns_not_found_for_an_unknown_transaction() {
    let state = state_with(InMemoryQueryStore::new(), InMemoryReceiptStore::new(), AuthState::disabled());
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/receipt/1/0xmissing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn receipt_route_returns_a_persisted_receipt() {
    let receipts = InMemoryReceiptStore::new();
    let receipt = Receipt::success(ChainId(1), "0xabc".to_string(), 100, Some(TableId(7)));
    receipts.put(&receipt).await.unwrap();

    let state = state_with(InMemoryQueryStore::new(), receipts, AuthState::disabled());
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/receipt/1/0xabc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["table_id"], 7);
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn receipt_route_surfaces_a_failed_batch() {
    let receipts = InMemoryReceiptStore::new();
    let receipt = Receipt::failure(ChainId(5), "0xdead".to_string(), 42, "row count would exceed cap", 1);
    receipts.put(&receipt).await.unwrap();

    let state = state_with(InMemoryQueryStore::new(), receipts, AuthState::disabled());
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/receipt/5/0xdead")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"], "row count would exceed cap");
    assert_eq!(body["error_event_index"], 1);
}
