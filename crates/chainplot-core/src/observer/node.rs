use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{normalize_lookup_error, CoreError};
use crate::rpc::{BlockInfo, NodeRpc};
use crate::series::{Checkpoint, Position, Sample};

use super::{ChainObserver, Observation};

// ==============================================================================
// Metrics
// ==============================================================================

/// What a series measures at each sampled height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Block timestamp.
    Time,
    /// Block difficulty, rounded to two decimals.
    Difficulty,
    /// Mean seconds per block across the window.
    BlockTime,
    /// Serialized block size in bytes.
    BlockSize,
    /// Transactions in the window.
    TxCount,
    /// Fees paid in the window.
    FeesTotal,
    /// Average fee rate in the window.
    FeesPerKb,
    /// Shield pool chain value.
    ShieldSupply,
    /// Zerocoin supply for one denomination.
    ZerocoinDenom(u32),
    /// Zerocoin supply across all denominations.
    ZerocoinTotal,
    /// 1 when the block pays the same masternode as its parent, else 0.
    MasternodeRepeat,
}

impl Metric {
    fn needs_header(self) -> bool {
        matches!(self, Self::ShieldSupply)
    }

    fn needs_index_stats(self) -> bool {
        matches!(self, Self::TxCount | Self::FeesTotal | Self::FeesPerKb)
    }
}

// ==============================================================================
// Node Observer
// ==============================================================================

/// [`ChainObserver`] backed by a node's JSON-RPC interface.
///
/// Each sample fetches only what its metrics need: the block itself, plus
/// the header, window stats, window-start block, or parent payee as
/// required. The payee of the last sampled block is remembered, so walking
/// the chain one block at a time costs one coinstake lookup per block.
pub struct NodeObserver {
    rpc: Arc<dyn NodeRpc>,
    metrics: Vec<(String, Metric)>,
    zero_through: Option<Position>,
    last_payee: Mutex<Option<PayeeAt>>,
}

/// Masternode payee of the block with hash `block`.
#[derive(Debug, Clone)]
struct PayeeAt {
    block: String,
    payee: Option<String>,
}

impl NodeObserver {
    pub fn new(rpc: Arc<dyn NodeRpc>, metrics: Vec<(String, Metric)>) -> Self {
        Self {
            rpc,
            metrics,
            zero_through: None,
            last_payee: Mutex::new(None),
        }
    }

    /// Report zero for every series at heights up to and including `height`
    /// without querying the node (blocks before proof of stake carry no
    /// masternode payments).
    pub fn with_zero_through(mut self, height: Position) -> Self {
        self.zero_through = Some(height);
        self
    }

    fn wants(&self, pred: impl Fn(Metric) -> bool) -> bool {
        self.metrics.iter().any(|(_, metric)| pred(*metric))
    }

    async fn block_at(&self, height: Position) -> Result<BlockInfo, CoreError> {
        let hash = self.rpc.get_block_hash(height).await?;
        self.rpc
            .get_block(&hash)
            .await
            .map_err(|err| normalize_lookup_error(height, err))
    }

    /// Address paid by the coinstake (second transaction) of `block`.
    /// Blocks without a coinstake, or coinstakes without an address, have
    /// no payee.
    async fn masternode_payee(&self, block: &BlockInfo) -> Result<Option<String>, CoreError> {
        let Some(coinstake) = block.tx.get(1) else {
            return Ok(None);
        };
        let tx = self.rpc.get_raw_transaction(coinstake).await?;
        Ok(tx.last_output_address().map(str::to_owned))
    }

    /// Payee of the parent of `block` at `position`, served from the cache
    /// when the previous sample was that parent.
    async fn parent_payee(
        &self,
        block: &BlockInfo,
        position: Position,
    ) -> Result<Option<String>, CoreError> {
        if let Some(parent_hash) = &block.previous_block_hash {
            if let Some(cached) = self.cached_payee(parent_hash) {
                return Ok(cached);
            }
        }

        let parent = match &block.previous_block_hash {
            Some(parent_hash) => self
                .rpc
                .get_block(parent_hash)
                .await
                .map_err(|err| normalize_lookup_error(position - 1, err))?,
            None => self.block_at(position - 1).await?,
        };
        self.masternode_payee(&parent).await
    }

    fn cached_payee(&self, block_hash: &str) -> Option<Option<String>> {
        let cache = self.last_payee.lock().ok()?;
        cache
            .as_ref()
            .filter(|entry| entry.block == block_hash)
            .map(|entry| entry.payee.clone())
    }

    fn remember_payee(&self, block_hash: &str, payee: Option<String>) {
        if let Ok(mut cache) = self.last_payee.lock() {
            *cache = Some(PayeeAt {
                block: block_hash.to_owned(),
                payee,
            });
        }
    }
}

#[async_trait]
impl ChainObserver for NodeObserver {
    async fn head_position(&self) -> Result<Position, CoreError> {
        self.rpc.get_block_count().await
    }

    async fn hash_at(&self, position: Position) -> Result<Checkpoint, CoreError> {
        self.rpc.get_block_hash(position).await.map(Checkpoint)
    }

    async fn sample(&self, position: Position, window: u64) -> Result<Observation, CoreError> {
        if self.zero_through.is_some_and(|through| position <= through) {
            let checkpoint = self.hash_at(position).await?;
            return Ok(Observation {
                checkpoint,
                values: self
                    .metrics
                    .iter()
                    .map(|(name, _)| (name.clone(), 0.0))
                    .collect(),
            });
        }

        let block = self.block_at(position).await?;

        let header = if self.wants(Metric::needs_header) {
            Some(
                self.rpc
                    .get_block_header(&block.hash)
                    .await
                    .map_err(|err| normalize_lookup_error(position, err))?,
            )
        } else {
            None
        };

        let window_start = position.saturating_sub(window);
        let stats = if self.wants(Metric::needs_index_stats) {
            Some(self.rpc.get_block_index_stats(window_start, window).await?)
        } else {
            None
        };

        let window_start_time = if self.wants(|m| m == Metric::BlockTime) && position >= window {
            Some(self.block_at(window_start).await?.time)
        } else {
            None
        };

        let repeated_payee = if self.wants(|m| m == Metric::MasternodeRepeat) && position > 0 {
            let previous = self.parent_payee(&block, position).await?;
            let current = self.masternode_payee(&block).await?;
            let repeated = current.is_some() && current == previous;
            self.remember_payee(&block.hash, current);
            repeated
        } else {
            false
        };

        let mut sample = Sample::new();
        for (name, metric) in &self.metrics {
            let value = match metric {
                Metric::Time => block.time as f64,
                Metric::Difficulty => (block.difficulty * 100.0).round() / 100.0,
                Metric::BlockTime => match window_start_time {
                    Some(start) if window > 0 => {
                        (block.time as f64 - start as f64) / window as f64
                    }
                    _ => 0.0,
                },
                Metric::BlockSize => block.size as f64,
                Metric::TxCount => stats.as_ref().map_or(0.0, |s| s.tx_count as f64),
                Metric::FeesTotal => stats.as_ref().map_or(0.0, |s| s.fees_total),
                Metric::FeesPerKb => stats.as_ref().map_or(0.0, |s| s.fee_per_kb),
                Metric::ShieldSupply => header
                    .as_ref()
                    .and_then(|h| h.shield_pool_value.as_ref())
                    .map_or(0.0, |v| v.chain_value),
                Metric::ZerocoinDenom(denom) => zerocoin_supply(&block, &denom.to_string())?,
                Metric::ZerocoinTotal => zerocoin_supply(&block, "total")?,
                Metric::MasternodeRepeat => {
                    if repeated_payee {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            sample.insert(name.clone(), value);
        }

        debug!(position, window, series = sample.len(), "sampled block");
        Ok(Observation {
            checkpoint: Checkpoint(block.hash),
            values: sample,
        })
    }
}

fn zerocoin_supply(block: &BlockInfo, key: &str) -> Result<f64, CoreError> {
    block
        .zerocoin_supply
        .as_ref()
        .and_then(|supply| supply.get(key))
        .copied()
        .ok_or_else(|| {
            CoreError::InvalidData(format!(
                "block {} has no zerocoin supply for `{key}`",
                block.height
            ))
        })
}
