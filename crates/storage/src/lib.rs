//! Postgres-backed implementation of the store port the Processor is built
//! against (SPEC_FULL.md §6): `registry`, `system_acl`, and the `_<hex>`
//! table-data relations, with savepoints and SERIALIZABLE transactions.

pub mod postgres;
pub mod query;
pub mod receipts;

pub use postgres::{PgConfig, PostgresStore};
pub use query::{InMemoryQueryStore, QueryStore};
pub use receipts::{InMemoryReceiptStore, PostgresReceiptStore, ReceiptStore};
