//! EVM chain feed (SPEC_FULL.md §6.1): one [`EthereumWatcher`] per configured
//! chain, subscribing to registry-contract logs over HTTP or WebSocket
//! JSON-RPC and redelivering them once they've aged past the chain's
//! configured reorg-depth delay.

mod event;
mod provider;
mod subscription;

use std::str::FromStr;

use async_trait::async_trait;
use ethers::types::H160;

use validator_common::{ChainConfig, Error, Result};
use validator_core::{BlockStatus, ChainId, ChainWatcher, EventSubscription};

use provider::EthereumProvider;
use subscription::EthereumSubscription;

/// Watches one EVM chain's registry contract for `TableCreated`/`RunSQL`/
/// `PrivilegesGranted`/`PrivilegesRevoked` logs.
pub struct EthereumWatcher {
    chain_id: ChainId,
    rpc_url: String,
    ws_url: Option<String>,
    registry_address: H160,
    reorg_depth: u64,
}

impl EthereumWatcher {
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let registry_address = H160::from_str(&config.registry_address).map_err(|e| {
            Error::chain(config.name.clone(), format!("invalid registry_address `{}`: {e}", config.registry_address))
        })?;

        Ok(Self {
            chain_id: ChainId(config.chain_id),
            rpc_url: config.rpc_url.clone(),
            ws_url: config.ws_url.clone(),
            registry_address,
            reorg_depth: config.reorg_depth,
        })
    }

    /// Prefers the websocket endpoint when configured, falling back to HTTP
    /// polling of `eth_getLogs` for everything else.
    async fn connect(&self) -> Result<EthereumProvider> {
        match &self.ws_url {
            Some(ws_url) => EthereumProvider::connect_ws(ws_url).await,
            None => EthereumProvider::connect_http(&self.rpc_url),
        }
    }
}

#[async_trait]
impl ChainWatcher for EthereumWatcher {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn latest_block_with_status(&self, status: BlockStatus) -> Result<u64> {
        let provider = self.connect().await?;
        provider.block_number_for_status(status).await
    }

    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>> {
        let provider = self.connect().await?;
        let start_block = provider.latest_block_number().await?;
        Ok(Box::new(EthereumSubscription::new(
            self.chain_id,
            provider,
            self.registry_address,
            self.reorg_depth,
            start_block,
        )))
    }
}
