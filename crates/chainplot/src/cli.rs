use std::path::PathBuf;
use std::time::Duration;

use chainplot_core::{ActivityEndpoints, RetryPolicy};
use clap::{Parser, ValueEnum};

use crate::charts::{ChartKind, ChartParams};

/// Network the node serves. Picks the default RPC port and the height at
/// which proof of stake (and masternode payments) begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn default_rpc_url(self) -> String {
        match self {
            Self::Mainnet => "http://127.0.0.1:51473".to_owned(),
            Self::Testnet => "http://127.0.0.1:51475".to_owned(),
        }
    }

    pub fn last_pow_block(self) -> u64 {
        match self {
            Self::Mainnet => 259_200,
            Self::Testnet => 200,
        }
    }

    /// Whether `getblockchaininfo`'s `chain` field belongs to this network.
    pub fn matches_chain(self, chain: &str) -> bool {
        match self {
            Self::Mainnet => chain == "main",
            Self::Testnet => chain == "test" || chain == "regtest",
        }
    }
}

/// Poll a node and append reorg-safe chart series to JSON files.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Node network.
    #[arg(long, value_enum, default_value_t = Network::Mainnet, env = "CHAINPLOT_NETWORK")]
    pub network: Network,

    /// Node RPC URL. Defaults to localhost on the network's RPC port.
    #[arg(long, env = "CHAINPLOT_RPC_URL")]
    pub rpc_url: Option<String>,

    /// RPC username.
    #[arg(long, env = "CHAINPLOT_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, env = "CHAINPLOT_RPC_PASS")]
    pub rpc_pass: Option<String>,

    /// Cookie file with `user:password`, used when no user/pass is given.
    #[arg(long, env = "CHAINPLOT_RPC_COOKIE_FILE")]
    pub rpc_cookie_file: Option<PathBuf>,

    /// Client-side cap on outbound RPC requests per second.
    #[arg(long)]
    pub rpc_requests_per_second: Option<u32>,

    /// Directory holding one JSON document per chart.
    #[arg(long, default_value = "plot_data", env = "CHAINPLOT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Charts to update (repeatable).
    #[arg(long = "chart", value_enum, default_values_t = [ChartKind::Supply, ChartKind::Network])]
    pub charts: Vec<ChartKind>,

    /// Override the chart's step size (blocks per point).
    #[arg(long)]
    pub step_size: Option<u64>,

    /// Override the number of trailing points dropped on a reorg.
    #[arg(long)]
    pub rollback_window: Option<usize>,

    /// Override the history length below which reorgs are not checked.
    #[arg(long)]
    pub minimum_history: Option<usize>,

    /// Attempts per node call before giving up on the run.
    #[arg(long, default_value = "3")]
    pub retry_attempts: u32,

    /// Base delay between attempts, in milliseconds (grows linearly).
    #[arg(long, default_value = "500")]
    pub retry_backoff_ms: u64,

    /// Save progress every N new points during long catch-ups. Defaults
    /// to 100000 for the masternodes chart.
    #[arg(long)]
    pub persist_every: Option<usize>,

    /// Override the last proof-of-work height for the masternodes chart.
    #[arg(long)]
    pub last_pow_block: Option<u64>,

    /// First block with zerocoin supply; the zerocoin chart is seeded with
    /// zeros up to here.
    #[arg(long, default_value = "201400")]
    pub zerocoin_first_block: u64,

    /// GitHub repository (`owner/name`) for the github chart.
    #[arg(long, default_value = "PIVX-Project/PIVX")]
    pub github_repo: String,

    /// GitHub REST API root.
    #[arg(long, default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// GitHub token; raises the API rate limit.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// CoinGecko API root.
    #[arg(long, default_value = "https://api.coingecko.com/api/v3")]
    pub gecko_api_url: String,

    /// CoinGecko coin id.
    #[arg(long, default_value = "pivx")]
    pub gecko_coin: String,

    /// Client-side cap on CoinGecko requests per minute.
    #[arg(long, default_value = "10")]
    pub gecko_requests_per_minute: u32,
}

impl Cli {
    pub fn rpc_url(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }

    pub fn chart_params(&self) -> ChartParams {
        ChartParams {
            step_size: self.step_size,
            rollback_window: self.rollback_window,
            minimum_history: self.minimum_history,
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            last_pow_block: self
                .last_pow_block
                .unwrap_or_else(|| self.network.last_pow_block()),
            zerocoin_first_block: self.zerocoin_first_block,
        }
    }

    pub fn activity_endpoints(&self) -> ActivityEndpoints {
        ActivityEndpoints {
            github_api: self.github_api_url.clone(),
            github_repo: self.github_repo.clone(),
            github_token: self.github_token.clone(),
            gecko_api: self.gecko_api_url.clone(),
            gecko_coin: self.gecko_coin.clone(),
            gecko_requests_per_minute: Some(self.gecko_requests_per_minute),
        }
    }

    /// Requested charts in order, without repeats.
    pub fn selected_charts(&self) -> Vec<ChartKind> {
        let mut seen = Vec::with_capacity(self.charts.len());
        for chart in &self.charts {
            if !seen.contains(chart) {
                seen.push(*chart);
            }
        }
        seen
    }
}
