//! Receipt persistence (SPEC_FULL.md §3, §4.2, §6.3).
//!
//! The Processor itself never touches receipts — the surrounding system
//! persists one after `process_event` returns, and the API's
//! `POST /receipt/{chain_id}/{txn_hash}` route reads them back. Both sides
//! of that contract are external to the core, so this module, not
//! `validator-processor`, owns it.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use validator_common::Error;
use validator_core::{ChainId, Receipt, TableId};

/// Persists and looks up receipts by `(chain_id, txn_hash)`.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn put(&self, receipt: &Receipt) -> validator_common::Result<()>;
    async fn get(&self, chain_id: ChainId, txn_hash: &str) -> validator_common::Result<Option<Receipt>>;
}

/// Postgres-backed `ReceiptStore`, sharing the same pool as [`crate::PostgresStore`].
pub struct PostgresReceiptStore {
    pool: Pool<Postgres>,
}

impl PostgresReceiptStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Creates the `receipts` table if it doesn't already exist. Unlike
    /// `registry`/`system_acl`, the Processor never reads this table, so it
    /// is bootstrapped independently rather than in `PostgresStore::connect`.
    pub async fn ensure_schema(&self) -> validator_common::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                chain_id BIGINT NOT NULL,
                txn_hash TEXT NOT NULL,
                block_number BIGINT NOT NULL,
                table_id BIGINT,
                error TEXT,
                error_event_index INTEGER,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (chain_id, txn_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to create receipts table: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ReceiptStore for PostgresReceiptStore {
    async fn put(&self, receipt: &Receipt) -> validator_common::Result<()> {
        let table_id = receipt.table_id.map(|id| id.0 as i64);
        sqlx::query(
            "INSERT INTO receipts (chain_id, txn_hash, block_number, table_id, error, error_event_index)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (chain_id, txn_hash) DO UPDATE SET
                block_number = EXCLUDED.block_number,
                table_id = EXCLUDED.table_id,
                error = EXCLUDED.error,
                error_event_index = EXCLUDED.error_event_index",
        )
        .bind(receipt.chain_id.0)
        .bind(&receipt.txn_hash)
        .bind(receipt.block_number as i64)
        .bind(table_id)
        .bind(&receipt.error)
        .bind(receipt.error_event_index.map(|i| i as i32))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to persist receipt: {e}")))?;
        Ok(())
    }

    async fn get(&self, chain_id: ChainId, txn_hash: &str) -> validator_common::Result<Option<Receipt>> {
        let row = sqlx::query(
            "SELECT block_number, table_id, error, error_event_index FROM receipts
             WHERE chain_id = $1 AND txn_hash = $2",
        )
        .bind(chain_id.0)
        .bind(txn_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to look up receipt: {e}")))?;

        let Some(row) = row else { return Ok(None) };
        let block_number: i64 = row.try_get("block_number").map_err(|e| Error::storage(e.to_string()))?;
        let table_id: Option<i64> = row.try_get("table_id").map_err(|e| Error::storage(e.to_string()))?;
        let error: Option<String> = row.try_get("error").map_err(|e| Error::storage(e.to_string()))?;
        let error_event_index: Option<i32> =
            row.try_get("error_event_index").map_err(|e| Error::storage(e.to_string()))?;

        Ok(Some(Receipt {
            chain_id,
            txn_hash: txn_hash.to_string(),
            block_number: block_number as u64,
            table_id: table_id.map(|id| TableId(id as u64)),
            error,
            error_event_index: error_event_index.map(|i| i as u32),
        }))
    }
}

/// In-memory `ReceiptStore`, used by API tests that don't need a live database.
pub struct InMemoryReceiptStore {
    receipts: tokio::sync::Mutex<std::collections::HashMap<(i64, String), Receipt>>,
}

impl InMemoryReceiptStore {
    pub fn new() -> Self {
        Self {
            receipts: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryReceiptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn put(&self, receipt: &Receipt) -> validator_common::Result<()> {
        let key = (receipt.chain_id.0, receipt.txn_hash.clone());
        self.receipts.lock().await.insert(key, receipt.clone());
        Ok(())
    }

    async fn get(&self, chain_id: ChainId, txn_hash: &str) -> validator_common::Result<Option<Receipt>> {
        let key = (chain_id.0, txn_hash.to_string());
        Ok(self.receipts.lock().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_a_receipt() {
        let store = InMemoryReceiptStore::new();
        let receipt = Receipt::success(ChainId(1), "0xabc".to_string(), 100, Some(TableId(7)));
        store.put(&receipt).await.unwrap();

        let fetched = store.get(ChainId(1), "0xabc").await.unwrap().unwrap();
        assert_eq!(fetched.table_id, Some(TableId(7)));
        assert!(fetched.is_success());

        assert!(store.get(ChainId(1), "0xdoesnotexist").await.unwrap().is_none());
    }
}
