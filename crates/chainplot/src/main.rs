mod charts;
mod cli;

use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, WrapErr};

use chainplot_core::rpc::{HttpRpcClient, NodeRpc};
use chainplot_core::{
    run_activity, run_once, Accumulator, CoreError, HttpActivitySource, JsonFileStore,
    NodeObserver, RetryPolicy, RunOptions,
};

use crate::charts::{ChartDefinition, ChartKind};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let selected = args.selected_charts();
    let rpc = if selected.iter().any(|kind| kind.uses_node()) {
        Some(connect_node(&args).await?)
    } else {
        None
    };

    let store = JsonFileStore::new(&args.data_dir)
        .wrap_err_with(|| format!("open data directory {}", args.data_dir.display()))?;
    let params = args.chart_params();

    let mut failed = Vec::new();
    for kind in selected {
        let outcome = match (kind, &rpc, charts::definition(kind, &params)) {
            (ChartKind::Github, _, _) => run_github(&args, &store, &params.retry).await,
            (_, Some(rpc), Some(chart)) => {
                let options = RunOptions {
                    persist_every: args.persist_every.or(chart.persist_every),
                };
                run_chart(chart, Arc::clone(rpc), &store, options).await
            }
            (_, _, _) => Err(CoreError::InvalidConfig(format!(
                "chart {} has no node definition",
                kind.key()
            ))),
        };
        if let Err(err) = outcome {
            tracing::error!(chart = kind.key(), error = %err, "chart update failed");
            failed.push(kind.key());
        }
    }

    if !failed.is_empty() {
        return Err(eyre!("{} chart(s) failed: {}", failed.len(), failed.join(", ")));
    }
    Ok(())
}

async fn connect_node(args: &cli::Cli) -> eyre::Result<Arc<dyn NodeRpc>> {
    let rpc_url = args.rpc_url();
    let rpc: Arc<dyn NodeRpc> = Arc::new(
        HttpRpcClient::new(
            &rpc_url,
            args.rpc_user.as_deref(),
            args.rpc_pass.as_deref(),
            args.rpc_cookie_file.as_deref(),
            args.rpc_requests_per_second,
        )
        .wrap_err("configure RPC client")?,
    );

    // Fail fast on an unreachable node instead of once per chart.
    let chain_info = rpc.get_blockchain_info().await.map_err(|err| {
        let message = format_rpc_connect_error(&rpc_url, &err.to_string());
        eyre!(message).wrap_err("while attempting to connect to node RPC")
    })?;

    tracing::info!(
        chain = %chain_info.chain,
        blocks = chain_info.blocks,
        "connected to node"
    );
    if !args.network.matches_chain(&chain_info.chain) {
        tracing::warn!(
            chain = %chain_info.chain,
            network = ?args.network,
            "node chain does not match --network; network-specific defaults may be wrong"
        );
    }
    Ok(rpc)
}

async fn run_chart(
    chart: ChartDefinition,
    rpc: Arc<dyn NodeRpc>,
    store: &JsonFileStore,
    options: RunOptions,
) -> Result<(), CoreError> {
    let accumulator = Accumulator::new(chart.config)?;
    let mut observer = NodeObserver::new(rpc, chart.metrics);
    if let Some(height) = chart.zero_through {
        observer = observer.with_zero_through(height);
    }
    let report = run_once(&accumulator, &observer, store, chart.kind.key(), options).await?;
    tracing::info!(
        chart = chart.kind.key(),
        bootstrapped = report.bootstrapped,
        rolled_back = report.rolled_back,
        appended = report.appended,
        last = ?report.last_position,
        "chart updated"
    );
    Ok(())
}

async fn run_github(
    args: &cli::Cli,
    store: &JsonFileStore,
    retry: &RetryPolicy,
) -> Result<(), CoreError> {
    let source = HttpActivitySource::new(&args.activity_endpoints())?;
    let report = run_activity(&source, store, ChartKind::Github.key(), retry).await?;
    tracing::info!(
        chart = ChartKind::Github.key(),
        weeks = report.weeks,
        last_week = ?report.last_week,
        "chart updated"
    );
    Ok(())
}

fn format_rpc_connect_error(rpc_url: &str, source_error: &str) -> String {
    let mut lines = vec![
        format!("could not connect to RPC endpoint `{rpc_url}`"),
        format!("RPC error: {source_error}"),
    ];

    if source_error.contains("Could not resolve host") || source_error.contains("dns error") {
        lines.push(
            "hint: hostname resolution failed; verify the endpoint hostname and your DNS/network"
                .into(),
        );
    } else if source_error.contains("Connection refused") || source_error.contains("connect error")
    {
        lines.push(
            "hint: nothing is listening; check that the node runs with -server and the RPC port matches --network"
                .into(),
        );
    } else if source_error.contains("401") || source_error.contains("403") {
        lines.push(
            "hint: authentication failed; verify --rpc-user/--rpc-pass or --rpc-cookie-file".into(),
        );
    } else if source_error.contains("-28") {
        lines.push("hint: node is still warming up; retry once it has finished loading".into());
    } else if source_error.contains("error sending request for url") {
        lines.push("hint: request could not be sent; verify URL format, network access, and endpoint reachability".into());
    }

    lines.join("\n")
}
