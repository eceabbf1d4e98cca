//! Shared test helpers for `chainplot-core` unit tests.
//!
//! Consolidates config and series builders so that tests across modules
//! share one source of truth for dummy deployments, plus block fixtures for
//! the node-backed observer.

use std::time::Duration;

use crate::config::{AccumulatorConfig, RetryPolicy, Seed, SeriesSpec};
use crate::rpc::types::{BlockHeaderInfo, BlockIndexStats, BlockInfo, ShieldPoolValue};
use crate::series::{Checkpoint, Position, SeriesSet};

// ==============================================================================
// Accumulator Helpers
// ==============================================================================

/// Deterministic 64-hex-digit "block hash" for a height.
pub fn hash_for(position: Position) -> String {
    format!("{position:064x}")
}

/// A block-chart deployment: step 100, rollback window 3, minimum history
/// 6, seeded with a single zero point at height 0, retries without delay.
pub fn block_config(names: &[&str]) -> AccumulatorConfig {
    AccumulatorConfig {
        step_size: 100,
        rollback_window: 3,
        minimum_history: 6,
        series: names.iter().map(|n| SeriesSpec::new(*n)).collect(),
        seed: Seed {
            origin: 0,
            points: 1,
        },
        retry: RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        },
    }
}

/// A valid series set with `count` points starting at `start`, every value
/// equal to its position, anchored to [`hash_for`] of the last position.
pub fn series_with_axis(config: &AccumulatorConfig, start: Position, count: usize) -> SeriesSet {
    let axis: Vec<Position> = (0..count as u64)
        .map(|i| start + i * config.step_size)
        .collect();
    let values: Vec<f64> = axis.iter().map(|p| *p as f64).collect();
    SeriesSet {
        step_size: Some(config.step_size),
        checkpoint: axis.last().map(|p| Checkpoint(hash_for(*p))),
        series: config
            .series_names()
            .map(|name| (name.to_owned(), values.clone()))
            .collect(),
        axis,
    }
}

// ==============================================================================
// Block Fixtures
// ==============================================================================

/// A block at `height` with one coinbase and one coinstake transaction,
/// a block every 60 seconds, and a zerocoin supply of `height` per
/// denomination.
pub fn make_block(height: Position) -> BlockInfo {
    let denoms = ["1", "5", "10", "50", "100", "500", "1000", "5000"];
    let mut supply: std::collections::BTreeMap<String, f64> = denoms
        .iter()
        .map(|d| ((*d).to_owned(), height as f64))
        .collect();
    supply.insert("total".to_owned(), height as f64 * denoms.len() as f64);

    BlockInfo {
        hash: hash_for(height),
        height,
        time: 1_600_000_000 + height * 60,
        size: 1000 + height,
        difficulty: 1234.5678,
        previous_block_hash: height.checked_sub(1).map(hash_for),
        tx: vec![
            format!("coinbase-{height}"),
            format!("coinstake-{height}"),
        ],
        zerocoin_supply: Some(supply),
    }
}

pub fn make_header(height: Position, shield: f64) -> BlockHeaderInfo {
    BlockHeaderInfo {
        hash: hash_for(height),
        height,
        time: 1_600_000_000 + height * 60,
        shield_pool_value: Some(ShieldPoolValue { chain_value: shield }),
    }
}

pub fn make_index_stats(txs: u64) -> BlockIndexStats {
    BlockIndexStats {
        tx_count: txs,
        fees_total: txs as f64 * 0.0001,
        fee_per_kb: 0.0001,
    }
}
