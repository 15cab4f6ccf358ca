//! The HTTP/JSON-RPC front end (SPEC_FULL.md §6.3): `POST /query`,
//! `POST /receipt/{chain_id}/{txn_hash}`, `GET /healthz`.

use std::sync::Arc;

use axum::extract::{FromRef, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use validator_core::{ChainId, Receipt};
use validator_sql::{QueryType, ValidationError, Validator};
use validator_storage::{QueryStore, ReceiptStore};

use crate::auth::{AuthState, AuthenticatedCaller};

/// Shared state for every route. `Clone` is cheap: everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<Validator>,
    pub store: Arc<dyn QueryStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub health: Arc<validator_core::security::HealthChecker>,
    pub auth: AuthState,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/query", post(query))
        .route("/receipt/:chain_id/:txn_hash", post(receipt))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_http_server(addr: std::net::SocketAddr, state: AppState) -> validator_common::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| validator_common::Error::storage(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "HTTP API listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| validator_common::Error::storage(format!("HTTP server error: {e}")))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    chains: std::collections::HashMap<String, ChainHealthResponse>,
}

#[derive(Debug, Serialize)]
struct ChainHealthResponse {
    healthy: bool,
    consecutive_failures: u32,
    latency_ms: Option<u64>,
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let all = state.health.get_all_health().await;
    let overall_healthy = all.values().all(|h| h.is_healthy);
    let chains = all
        .into_iter()
        .map(|(chain, h)| {
            (
                chain,
                ChainHealthResponse {
                    healthy: h.is_healthy,
                    consecutive_failures: h.consecutive_failures,
                    latency_ms: h.latency_ms,
                },
            )
        })
        .collect();

    let status_code = if overall_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = HealthResponse {
        status: if overall_healthy { "ok" } else { "degraded" },
        chains,
    };
    (status_code, Json(body))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    sql: String,
}

/// `/query` runs whatever the Validator classifies as a `Read` statement
/// directly against the store. Unlike `WriteStmt`/`CreateStmt`, a `ReadStmt`
/// is never rewritten to a table's stored `_<hex>` name (SPEC_FULL.md §9,
/// "read-path object shape"): the SQL a caller submits here is executed
/// exactly as validated, so it must already reference the relation by its
/// stored name — resolving a human-readable table name to that form is a
/// registry lookup the caller performs beforehand, not something this route
/// does on their behalf.
async fn query(State(state): State<AppState>, _caller: AuthenticatedCaller, Json(req): Json<QueryRequest>) -> impl IntoResponse {
    let (kind, read, _writes) = match state.validator.validate_run(&req.sql) {
        Ok(parsed) => parsed,
        Err(e) => return validation_error_response(e),
    };

    let Some(read) = (if kind == QueryType::Read { read } else { None }) else {
        return validation_error_response(ValidationError::NoTopLevelUpdateInsertDelete);
    };

    match state.store.query_json(read.canonical_sql()).await {
        Ok(rows) => (StatusCode::OK, Json(json!({ "rows": rows }))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn validation_error_response(err: ValidationError) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn receipt(
    State(state): State<AppState>,
    _caller: AuthenticatedCaller,
    Path((chain_id, txn_hash)): Path<(i64, String)>,
) -> impl IntoResponse {
    match state.receipts.get(ChainId(chain_id), &txn_hash).await {
        Ok(Some(receipt)) => (StatusCode::OK, Json(receipt_response(receipt))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "receipt not found" }))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn receipt_response(receipt: Receipt) -> serde_json::Value {
    json!({
        "chain_id": receipt.chain_id.0,
        "txn_hash": receipt.txn_hash,
        "block_number": receipt.block_number,
        "table_id": receipt.table_id.map(|id| id.0),
        "error": receipt.error,
        "error_event_index": receipt.error_event_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator_storage::InMemoryReceiptStore;

    fn test_validator() -> Arc<Validator> {
        let types: std::collections::HashSet<String> = ["int8".to_string(), "text".to_string()].into_iter().collect();
        Arc::new(Validator::new("system_", types))
    }

    #[test]
    fn health_response_reports_degraded_when_any_chain_unhealthy() {
        let mut chains = std::collections::HashMap::new();
        chains.insert(
            "ethereum".to_string(),
            ChainHealthResponse { healthy: false, consecutive_failures: 4, latency_ms: None },
        );
        let overall_healthy = chains.values().all(|h| h.healthy);
        assert!(!overall_healthy);
    }

    #[tokio::test]
    async fn receipt_not_found_returns_none() {
        let store = InMemoryReceiptStore::new();
        let result = store.get(ChainId(1), "0xmissing").await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn non_read_statement_is_rejected_before_reaching_the_store() {
        let validator = test_validator();
        let (kind, read, _) = validator.validate_run("SELECT * FROM widgets").unwrap();
        assert_eq!(kind, QueryType::Read);
        assert!(read.is_some());

        let write_err = validator.validate_run("INSERT INTO widgets (id) VALUES (1)").unwrap();
        assert_eq!(write_err.0, QueryType::Write);
    }
}
