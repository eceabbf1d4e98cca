//! Decoded results of the node RPC methods chainplot calls.
//!
//! Only the fields the observers read are kept; everything else in the
//! node's verbose JSON is ignored on deserialization.

use std::collections::BTreeMap;

use serde::Deserialize;

// ==============================================================================
// Chain Info
// ==============================================================================

/// Basic chain information from `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
}

// ==============================================================================
// Blocks
// ==============================================================================

/// Verbose `getblock` result.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    pub size: u64,
    pub difficulty: f64,
    /// Absent on the genesis block.
    #[serde(rename = "previousblockhash", default)]
    pub previous_block_hash: Option<String>,
    /// Transaction ids, coinbase first.
    #[serde(default)]
    pub tx: Vec<String>,
    /// Zerocoin supply per denomination plus `total`; absent on chains or
    /// heights without zerocoin.
    #[serde(rename = "zPIVsupply", default)]
    pub zerocoin_supply: Option<BTreeMap<String, f64>>,
}

/// Verbose `getblockheader` result.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderInfo {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    #[serde(default)]
    pub shield_pool_value: Option<ShieldPoolValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShieldPoolValue {
    #[serde(rename = "chainValue")]
    pub chain_value: f64,
}

/// Aggregates from `getblockindexstats` over a height range.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockIndexStats {
    #[serde(rename = "txcount_all")]
    pub tx_count: u64,
    #[serde(rename = "ttlfee_all")]
    pub fees_total: f64,
    #[serde(rename = "feeperkb")]
    pub fee_per_kb: f64,
}

// ==============================================================================
// Transactions
// ==============================================================================

/// Verbose `getrawtransaction` result, outputs only.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub vout: Vec<TxOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOut {
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl RawTransaction {
    /// First address of the last output: where a coinstake pays the
    /// masternode reward.
    pub fn last_output_address(&self) -> Option<&str> {
        self.vout
            .last()
            .and_then(|out| out.script_pub_key.addresses.first())
            .map(String::as_str)
    }
}
