use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CoreError, RpcError};
use crate::test_util::{hash_for, make_block, make_header, make_index_stats};

use super::types::{BlockHeaderInfo, BlockIndexStats, BlockInfo, ChainInfo, RawTransaction};
use super::NodeRpc;

/// A mock node for testing. Serves canned blocks keyed by height and hash
/// from maps populated via the builder pattern.
pub struct MockRpc {
    tip: u64,
    blocks: HashMap<String, BlockInfo>,
    headers: HashMap<String, BlockHeaderInfo>,
    stats: HashMap<(u64, u64), BlockIndexStats>,
    transactions: HashMap<String, RawTransaction>,
    requests: Mutex<Vec<String>>,
}

impl MockRpc {
    pub fn builder() -> MockRpcBuilder {
        MockRpcBuilder {
            tip: 0,
            blocks: HashMap::new(),
            headers: HashMap::new(),
            stats: HashMap::new(),
            transactions: HashMap::new(),
        }
    }

    /// Every RPC method invoked so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn record(&self, method: &str) {
        self.requests
            .lock()
            .expect("requests lock")
            .push(method.to_owned());
    }
}

pub struct MockRpcBuilder {
    tip: u64,
    blocks: HashMap<String, BlockInfo>,
    headers: HashMap<String, BlockHeaderInfo>,
    stats: HashMap<(u64, u64), BlockIndexStats>,
    transactions: HashMap<String, RawTransaction>,
}

impl MockRpcBuilder {
    /// Fill heights `0..=tip` with [`make_block`] / [`make_header`] fixtures
    /// (shield supply equal to the height).
    pub fn with_chain(mut self, tip: u64) -> Self {
        self.tip = tip;
        for height in 0..=tip {
            self = self
                .with_block(make_block(height))
                .with_header(make_header(height, height as f64));
        }
        self
    }

    pub fn with_block(mut self, block: BlockInfo) -> Self {
        self.tip = self.tip.max(block.height);
        self.blocks.insert(block.hash.clone(), block);
        self
    }

    pub fn with_header(mut self, header: BlockHeaderInfo) -> Self {
        self.headers.insert(header.hash.clone(), header);
        self
    }

    pub fn with_index_stats(mut self, from: u64, count: u64, stats: BlockIndexStats) -> Self {
        self.stats.insert((from, count), stats);
        self
    }

    pub fn with_transaction(mut self, tx: RawTransaction) -> Self {
        self.transactions.insert(tx.txid.clone(), tx);
        self
    }

    pub fn build(self) -> MockRpc {
        MockRpc {
            tip: self.tip,
            blocks: self.blocks,
            headers: self.headers,
            stats: self.stats,
            transactions: self.transactions,
            requests: Mutex::new(Vec::new()),
        }
    }
}

fn not_found(what: &str) -> CoreError {
    CoreError::Rpc(RpcError::ServerError {
        code: -5,
        message: format!("{what} not found"),
    })
}

#[async_trait]
impl NodeRpc for MockRpc {
    async fn get_blockchain_info(&self) -> Result<ChainInfo, CoreError> {
        self.record("getblockchaininfo");
        Ok(ChainInfo {
            chain: "regtest".into(),
            blocks: self.tip,
            best_block_hash: hash_for(self.tip),
        })
    }

    async fn get_block_count(&self) -> Result<u64, CoreError> {
        self.record("getblockcount");
        Ok(self.tip)
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, CoreError> {
        self.record("getblockhash");
        self.blocks
            .values()
            .find(|block| block.height == height)
            .map(|block| block.hash.clone())
            .ok_or(CoreError::NotFound { position: height })
    }

    async fn get_block(&self, hash: &str) -> Result<BlockInfo, CoreError> {
        self.record("getblock");
        self.blocks.get(hash).cloned().ok_or_else(|| not_found("Block"))
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeaderInfo, CoreError> {
        self.record("getblockheader");
        self.headers
            .get(hash)
            .cloned()
            .ok_or_else(|| not_found("Block header"))
    }

    async fn get_block_index_stats(
        &self,
        from_height: u64,
        count: u64,
    ) -> Result<BlockIndexStats, CoreError> {
        self.record("getblockindexstats");
        Ok(self
            .stats
            .get(&(from_height, count))
            .cloned()
            .unwrap_or_else(|| make_index_stats(count)))
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, CoreError> {
        self.record("getrawtransaction");
        self.transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| not_found("Transaction"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_chain_serves_every_height() {
        let rpc = MockRpc::builder().with_chain(5).build();
        assert_eq!(rpc.get_block_count().await.unwrap(), 5);

        let hash = rpc.get_block_hash(3).await.unwrap();
        assert_eq!(hash, hash_for(3));

        let block = rpc.get_block(&hash).await.unwrap();
        assert_eq!(block.height, 3);
        assert_eq!(block.previous_block_hash, Some(hash_for(2)));
    }

    #[tokio::test]
    async fn unknown_height_is_not_found() {
        let rpc = MockRpc::builder().with_chain(2).build();
        let err = rpc.get_block_hash(3).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { position: 3 }));
    }
}
