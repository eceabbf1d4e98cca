//! Node JSON-RPC abstraction layer.
//!
//! Defines the [`NodeRpc`] trait and provides an HTTP JSON-RPC
//! implementation ([`HttpRpcClient`]) plus a test mock (`mock::MockRpc`).

mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use http_adapter::HttpRpcClient;
pub use types::{BlockHeaderInfo, BlockIndexStats, BlockInfo, ChainInfo, RawTransaction};

use async_trait::async_trait;

use crate::error::CoreError;

/// The node RPC methods chainplot needs.
///
/// Implementations are expected to handle authentication, connection
/// management, and response deserialization internally. Height lookups
/// past the tip must fail with [`CoreError::NotFound`].
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Fetch basic chain info (network, block count).
    async fn get_blockchain_info(&self) -> Result<ChainInfo, CoreError>;

    async fn get_block_count(&self) -> Result<u64, CoreError>;

    async fn get_block_hash(&self, height: u64) -> Result<String, CoreError>;

    async fn get_block(&self, hash: &str) -> Result<BlockInfo, CoreError>;

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeaderInfo, CoreError>;

    /// Aggregate stats over `count` blocks starting at `from_height`.
    async fn get_block_index_stats(
        &self,
        from_height: u64,
        count: u64,
    ) -> Result<BlockIndexStats, CoreError>;

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, CoreError>;
}
