//! Traits the chain feed (`validator-chain`) implements and the node's
//! watcher tasks consume, one instance per configured chain (SPEC_FULL.md
//! §5, "multiple chain workers that must interleave run separate Processor
//! instances").

use async_trait::async_trait;

use validator_common::Result;

use crate::block::BlockStatus;
use crate::event::RegistryEvent;
use crate::ids::ChainId;

/// A live subscription to registry-contract events on one chain.
#[async_trait]
pub trait EventSubscription: Send + Sync {
    /// Wait for the next event that has passed the configured reorg delay.
    async fn next(&mut self) -> Option<RegistryEvent>;

    async fn close(&mut self) -> Result<()>;
}

/// A chain-specific watcher, implemented once per EVM chain.
#[async_trait]
pub trait ChainWatcher: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// The latest block the node has observed at or above `status`.
    async fn latest_block_with_status(&self, status: BlockStatus) -> Result<u64>;

    /// Subscribe to registry events, already filtered by reorg depth.
    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>>;
}
