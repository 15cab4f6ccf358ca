//! Thin Http/Ws provider wrapper (SPEC_FULL.md §6.1).
//!
//! Kept in the teacher's Http/Ws enum-dispatch shape (`EthereumProvider`,
//! one match arm per transport) rather than behind a generic `Middleware`
//! bound, since `subscription.rs` only ever needs the three operations below.

use std::sync::Arc;

use ethers::providers::{Http, Middleware, Provider, Ws};
use ethers::types::{BlockNumber, Filter, Log};

use validator_common::{Error, Result};
use validator_core::BlockStatus;

#[derive(Debug, Clone)]
pub enum EthereumProvider {
    Http(Arc<Provider<Http>>),
    Ws(Arc<Provider<Ws>>),
}

impl EthereumProvider {
    pub fn connect_http(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| Error::chain(rpc_url, format!("failed to create http provider: {e}")))?;
        Ok(Self::Http(Arc::new(provider)))
    }

    pub async fn connect_ws(ws_url: &str) -> Result<Self> {
        let provider = Provider::<Ws>::connect(ws_url)
            .await
            .map_err(|e| Error::chain(ws_url, format!("failed to connect websocket provider: {e}")))?;
        Ok(Self::Ws(Arc::new(provider)))
    }

    pub async fn latest_block_number(&self) -> Result<u64> {
        let number = match self {
            EthereumProvider::Http(provider) => provider
                .get_block_number()
                .await
                .map_err(|e| Error::chain("ethereum", format!("failed to get latest block number: {e}")))?,
            EthereumProvider::Ws(provider) => provider
                .get_block_number()
                .await
                .map_err(|e| Error::chain("ethereum", format!("failed to get latest block number: {e}")))?,
        };
        Ok(number.as_u64())
    }

    /// Resolves a [`BlockStatus`] to the latest block number observed at or
    /// above it. There is no JSON-RPC tag for "justified"; it is treated the
    /// same as `Finalized`, matching how the teacher's provider collapsed
    /// the two execution-layer tags it didn't have a direct mapping for.
    pub async fn block_number_for_status(&self, status: BlockStatus) -> Result<u64> {
        let tag = match status {
            BlockStatus::Confirmed => BlockNumber::Latest,
            BlockStatus::Safe => BlockNumber::Safe,
            BlockStatus::Justified | BlockStatus::Finalized => BlockNumber::Finalized,
        };
        let block = match self {
            EthereumProvider::Http(provider) => provider
                .get_block(tag)
                .await
                .map_err(|e| Error::chain("ethereum", format!("failed to get block for status {status:?}: {e}")))?,
            EthereumProvider::Ws(provider) => provider
                .get_block(tag)
                .await
                .map_err(|e| Error::chain("ethereum", format!("failed to get block for status {status:?}: {e}")))?,
        };
        let block = block.ok_or_else(|| Error::chain("ethereum", format!("no block found for status {status:?}")))?;
        Ok(block.number.unwrap_or_default().as_u64())
    }

    pub async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        match self {
            EthereumProvider::Http(provider) => provider
                .get_logs(filter)
                .await
                .map_err(|e| Error::chain("ethereum", format!("failed to fetch logs: {e}"))),
            EthereumProvider::Ws(provider) => provider
                .get_logs(filter)
                .await
                .map_err(|e| Error::chain("ethereum", format!("failed to fetch logs: {e}"))),
        }
    }
}
