//! Receipts, emitted by the surrounding system after the Processor returns
//! (SPEC_FULL.md §3, §4.2).

use serde::{Deserialize, Serialize};

use crate::ids::{ChainId, TableId};

/// The outcome of processing a single on-chain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub chain_id: ChainId,
    pub txn_hash: String,
    pub block_number: u64,
    pub table_id: Option<TableId>,
    /// Human-readable error kind; empty on success.
    pub error: Option<String>,
    /// Index of the statement within the batch that failed, if any.
    pub error_event_index: Option<u32>,
}

impl Receipt {
    pub fn success(chain_id: ChainId, txn_hash: String, block_number: u64, table_id: Option<TableId>) -> Self {
        Self {
            chain_id,
            txn_hash,
            block_number,
            table_id,
            error: None,
            error_event_index: None,
        }
    }

    pub fn failure(
        chain_id: ChainId,
        txn_hash: String,
        block_number: u64,
        error: impl Into<String>,
        error_event_index: u32,
    ) -> Self {
        Self {
            chain_id,
            txn_hash,
            block_number,
            table_id: None,
            error: Some(error.into()),
            error_event_index: Some(error_event_index),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
