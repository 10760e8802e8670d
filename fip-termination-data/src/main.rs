//! Filecoin termination fee data CLI
//!
//! Collects per-miner termination fee snapshots and pledge penalty
//! scenarios from a Lotus node.

use std::{io, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fip_termination_data::{
    config::{DEFAULT_CONFIG_FILE, DEFAULT_RPC_TIMEOUT},
    report::{CsvReport, DiscardReport, ReportSink},
    ChainEpoch, CollectOptions, Collector, LotusClient, MinerId, NodeConfig, NodeEstimator,
    ScenarioSweep,
};

#[derive(Parser)]
#[command(name = "fip-termination-data")]
#[command(about = "Termination fee data for Filecoin FIP analysis")]
#[command(version)]
struct Cli {
    /// Path to env-style configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Per-call node RPC timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_RPC_TIMEOUT.as_secs())]
    rpc_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect per-miner termination fee data at an epoch
    Collect {
        /// Chain epoch to snapshot
        epoch: ChainEpoch,

        /// Log a progress line per miner
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        progress: bool,

        /// Log the raw economic result per miner
        #[arg(long)]
        debug: bool,

        /// Write the CSV report to stdout
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        csv: bool,

        /// Write per-sector CSV files to <dir>/<epoch>/<miner>.csv
        #[arg(long)]
        save_sectors_dir: Option<PathBuf>,

        /// Skip miners that fail instead of aborting
        #[arg(long)]
        resumable: bool,

        /// CSV file listing miners skipped in resumable mode
        #[arg(long)]
        failed_out: Option<PathBuf>,

        /// Only process miners with a larger ID than this one
        #[arg(long)]
        start_after: Option<MinerId>,

        /// Miners processed concurrently
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },

    /// Simulate termination penalties for pledge scenarios at an epoch
    PenaltyOnPledge {
        /// Chain epoch to snapshot
        epoch: ChainEpoch,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    let node_config = NodeConfig::load(&cli.config, Duration::from_secs(cli.rpc_timeout))
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let node = LotusClient::new(&node_config, cancel.clone())?;
    tracing::debug!("Using node at {}", node.endpoint());
    let model = NodeEstimator::new();

    match cli.command {
        Commands::Collect {
            epoch,
            progress,
            debug,
            csv,
            save_sectors_dir,
            resumable,
            failed_out,
            start_after,
            concurrency,
        } => {
            let options = CollectOptions {
                epoch,
                progress,
                debug,
                csv,
                save_sectors_dir,
                resumable,
                failed_out,
                start_after,
                concurrency,
            };

            let mut sink: Box<dyn ReportSink> = if options.csv {
                Box::new(CsvReport::new(io::stdout().lock())?)
            } else {
                Box::new(DiscardReport)
            };

            let collector = Collector::new(&node, &model, &options, cancel);
            collector.run(sink.as_mut()).await?;
            Ok(())
        }
        Commands::PenaltyOnPledge { epoch } => {
            let sweep = ScenarioSweep::new(
                &node,
                &model,
                fip_termination_data::reference_matrix(),
                cancel,
            )?;
            sweep.run(epoch, &mut io::stdout().lock()).await?;
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding node calls");
            cancel.cancel();
        }
    });
}
