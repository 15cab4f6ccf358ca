//! The read-path port the API's `POST /query` route executes validated
//! `SELECT` statements against (SPEC_FULL.md §6.3).
//!
//! Distinct from `validator_processor::Store`: that port is the Processor's
//! transactional write surface (savepoints, SERIALIZABLE begin/commit); this
//! one is a single stateless read, so it is its own trait rather than a
//! method bolted onto `Store`.

use async_trait::async_trait;

/// Executes a read-only SQL statement and returns its rows as JSON objects.
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn query_json(&self, sql: &str) -> validator_common::Result<Vec<serde_json::Map<String, serde_json::Value>>>;
}

/// An in-memory `QueryStore`, keyed by exact SQL text, for API tests that
/// don't need a live database.
#[derive(Default)]
pub struct InMemoryQueryStore {
    rows: std::collections::HashMap<String, Vec<serde_json::Map<String, serde_json::Value>>>,
}

impl InMemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the rows to return for an exact SQL string.
    pub fn with_rows(mut self, sql: impl Into<String>, rows: Vec<serde_json::Map<String, serde_json::Value>>) -> Self {
        self.rows.insert(sql.into(), rows);
        self
    }
}

#[async_trait]
impl QueryStore for InMemoryQueryStore {
    async fn query_json(&self, sql: &str) -> validator_common::Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        Ok(self.rows.get(sql).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_registered_rows_for_exact_sql_match() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), serde_json::json!(1));
        let store = InMemoryQueryStore::new().with_rows("SELECT * FROM widgets", vec![row.clone()]);

        let rows = store.query_json("SELECT * FROM widgets").await.unwrap();
        assert_eq!(rows, vec![row]);

        let empty = store.query_json("SELECT * FROM other").await.unwrap();
        assert!(empty.is_empty());
    }
}
