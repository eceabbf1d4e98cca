//! Built-in chart definitions: which series each chart tracks, how the node
//! is sampled for them, and the accumulator parameters they run with. The
//! `github` chart is not node-backed and has no definition here.

use chainplot_core::{AccumulatorConfig, Metric, Position, RetryPolicy, Seed, SeriesSpec};
use clap::ValueEnum;

const ZEROCOIN_DENOMINATIONS: [u32; 8] = [1, 5, 10, 50, 100, 500, 1000, 5000];

/// The masternode chart walks every block; save at least this often.
const MASTERNODE_PERSIST_EVERY: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartKind {
    Supply,
    Network,
    Zerocoin,
    Masternodes,
    Github,
}

impl ChartKind {
    /// Store key; the chart lands in `<data_dir>/<key>.json`.
    pub fn key(self) -> &'static str {
        match self {
            Self::Supply => "supply_data",
            Self::Network => "network_data",
            Self::Zerocoin => "zerocoin_data",
            Self::Masternodes => "mn_data",
            Self::Github => "github_data",
        }
    }

    /// Whether the chart is sampled from the node.
    pub fn uses_node(self) -> bool {
        !matches!(self, Self::Github)
    }
}

/// Operator overrides and network constants shared by every chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartParams {
    pub step_size: Option<u64>,
    pub rollback_window: Option<usize>,
    pub minimum_history: Option<usize>,
    pub retry: RetryPolicy,
    pub last_pow_block: Position,
    pub zerocoin_first_block: Position,
}

pub struct ChartDefinition {
    pub kind: ChartKind,
    pub config: AccumulatorConfig,
    pub metrics: Vec<(String, Metric)>,
    pub zero_through: Option<Position>,
    /// Intermediate save cadence used when the operator sets none.
    pub persist_every: Option<usize>,
}

/// The node-backed definition of `kind`, or `None` for charts that are
/// not sampled from the node.
pub fn definition(kind: ChartKind, params: &ChartParams) -> Option<ChartDefinition> {
    let (default_step, default_min_history) = match kind {
        ChartKind::Supply | ChartKind::Network => (100, 6),
        ChartKind::Zerocoin => (100, 3),
        ChartKind::Masternodes => (1, 6),
        ChartKind::Github => return None,
    };
    let step_size = params.step_size.unwrap_or(default_step);

    let metrics: Vec<(String, Metric)> = match kind {
        ChartKind::Supply => vec![
            ("time_axis".to_owned(), Metric::Time),
            ("shield_supply".to_owned(), Metric::ShieldSupply),
        ],
        ChartKind::Network => vec![
            ("time_axis".to_owned(), Metric::Time),
            ("difficulty".to_owned(), Metric::Difficulty),
            ("blocktime".to_owned(), Metric::BlockTime),
            ("blocksize".to_owned(), Metric::BlockSize),
            ("txs".to_owned(), Metric::TxCount),
            ("fees_ttl".to_owned(), Metric::FeesTotal),
            ("fees_perKb".to_owned(), Metric::FeesPerKb),
        ],
        ChartKind::Zerocoin => ZEROCOIN_DENOMINATIONS
            .iter()
            .map(|d| (format!("denom_{d}"), Metric::ZerocoinDenom(*d)))
            .chain(std::iter::once(("total".to_owned(), Metric::ZerocoinTotal)))
            .collect(),
        ChartKind::Masternodes => vec![
            ("time_axis".to_owned(), Metric::Time),
            ("double_mn_payments".to_owned(), Metric::MasternodeRepeat),
        ],
        ChartKind::Github => return None,
    };

    let series = metrics
        .iter()
        .map(|(name, metric)| match metric {
            Metric::MasternodeRepeat => SeriesSpec::cumulative(name.as_str()),
            _ => SeriesSpec::new(name.as_str()),
        })
        .collect();

    // Zerocoin supply does not exist before its first block; those heights
    // are pre-filled with zeros instead of being fetched.
    let seed_points = match kind {
        ChartKind::Zerocoin => usize::try_from(params.zerocoin_first_block / step_size)
            .unwrap_or(usize::MAX)
            .max(1),
        _ => 1,
    };

    let (zero_through, persist_every) = match kind {
        ChartKind::Masternodes => (Some(params.last_pow_block), Some(MASTERNODE_PERSIST_EVERY)),
        _ => (None, None),
    };

    Some(ChartDefinition {
        kind,
        config: AccumulatorConfig {
            step_size,
            rollback_window: params.rollback_window.unwrap_or(3),
            minimum_history: params.minimum_history.unwrap_or(default_min_history),
            series,
            seed: Seed {
                origin: 0,
                points: seed_points,
            },
            retry: params.retry,
        },
        metrics,
        zero_through,
        persist_every,
    })
}
