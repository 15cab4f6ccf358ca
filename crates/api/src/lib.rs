//! The HTTP/JSON-RPC front end (SPEC_FULL.md §6.3): a thin `axum` service
//! exposing `POST /query`, `POST /receipt/{chain_id}/{txn_hash}` and
//! `GET /healthz` over the Validator and the Processor's collaborators.

pub mod auth;
pub mod http;

pub use http::{router, start_http_server, AppState};
