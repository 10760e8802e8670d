//! The `collect` pipeline: per-miner termination economics at one epoch.
//!
//! [`Collector`] resolves the snapshot once, walks the miners in ascending
//! ID order, samples each miner's live sectors, asks the economic model for
//! the termination economics of the sample and streams one
//! [`MinerRecord`] per miner to a [`ReportSink`] as soon as it is known.
//!
//! With `concurrency > 1` several miners are in flight at once, but results
//! are still consumed strictly in miner order: the first failure in that
//! order ends the run and later results that already completed are dropped.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    amount::TokenAmount,
    config::CollectOptions,
    econ::{is_cancelled, EconomicModel, TerminationEstimate},
    enumerate::{list_miners_ordered, resolve_snapshot},
    error::{FipDataError, Result},
    node::NodeClient,
    report::{create_epoch_dir, write_sector_dump, FailureLog, ReportSink},
    sampler::{sample_live_sectors, sector_infos, MinerSample},
    types::{ChainEpoch, ChainSnapshot, MinerId, MinerSectorCount},
};

/// Column names of the per-miner report.
pub const MINER_REPORT_HEADER: [&str; 18] = [
    "Miner",
    "Epoch",
    "TotalBalance",
    "TotalBalanceFIL",
    "AvailableBalance",
    "AvailableBalanceFIL",
    "VestingFunds",
    "VestingFundsFIL",
    "InitialPledge",
    "InitialPledgeFIL",
    "FeeDebt",
    "FeeDebtFIL",
    "TerminationFee",
    "TerminationFeeFIL",
    "AvgTerminationFeePerPledge",
    "AvgTerminationFeePerPledgeFIL",
    "LiveSectors",
    "FaultySectors",
];

/// One normalized row of the per-miner report.
///
/// Every amount is non-negative. `avg_termination_fee_per_pledge` is the
/// fee per unit of pledge scaled by 10^18, so its FIL column reads as a
/// plain ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerRecord {
    pub miner: MinerId,
    pub epoch: ChainEpoch,
    pub total_balance: TokenAmount,
    pub available_balance: TokenAmount,
    pub vesting_funds: TokenAmount,
    pub initial_pledge: TokenAmount,
    pub fee_debt: TokenAmount,
    pub termination_fee: TokenAmount,
    pub avg_termination_fee_per_pledge: TokenAmount,
    pub live_sectors: u64,
    pub faulty_sectors: u64,
}

impl MinerRecord {
    /// Normalize a model result, rejecting negative amounts.
    pub fn from_estimate(
        miner: MinerId,
        epoch: ChainEpoch,
        estimate: &TerminationEstimate,
    ) -> Result<Self> {
        let amounts = [
            ("total balance", &estimate.total_balance),
            ("available balance", &estimate.available_balance),
            ("vesting funds", &estimate.vesting_funds),
            ("initial pledge", &estimate.initial_pledge),
            ("fee debt", &estimate.fee_debt),
            ("termination fee", &estimate.termination_fee),
        ];
        for (field, value) in amounts {
            if value.is_negative() {
                return Err(FipDataError::NegativeAmount {
                    miner: miner.to_string(),
                    field,
                    value: value.to_string(),
                });
            }
        }

        Ok(Self {
            miner,
            epoch,
            total_balance: estimate.total_balance.clone(),
            available_balance: estimate.available_balance.clone(),
            vesting_funds: estimate.vesting_funds.clone(),
            initial_pledge: estimate.initial_pledge.clone(),
            fee_debt: estimate.fee_debt.clone(),
            termination_fee: estimate.termination_fee.clone(),
            avg_termination_fee_per_pledge: estimate
                .termination_fee
                .ratio_per(&estimate.initial_pledge),
            live_sectors: estimate.live_sectors,
            faulty_sectors: estimate.faulty_sectors,
        })
    }

    /// Fields in [`MINER_REPORT_HEADER`] order.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(MINER_REPORT_HEADER.len());
        row.push(self.miner.to_string());
        row.push(self.epoch.to_string());
        for amount in [
            &self.total_balance,
            &self.available_balance,
            &self.vesting_funds,
            &self.initial_pledge,
            &self.fee_debt,
            &self.termination_fee,
            &self.avg_termination_fee_per_pledge,
        ] {
            row.push(amount.to_string());
            row.push(amount.report_fil());
        }
        row.push(self.live_sectors.to_string());
        row.push(self.faulty_sectors.to_string());
        row
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// Miners whose processing finished, successfully or not
    pub scanned: usize,
    /// Rows written to the report
    pub emitted: usize,
    /// Miners without live sectors
    pub skipped: usize,
    /// Miners skipped after a failure (resumable mode only)
    pub failed: usize,
}

enum MinerOutcome {
    Skipped,
    Computed {
        record: MinerRecord,
        estimate: TerminationEstimate,
        counts: MinerSectorCount,
        elapsed: Duration,
    },
}

/// Drives the per-miner collection loop.
pub struct Collector<'a> {
    node: &'a dyn NodeClient,
    model: &'a dyn EconomicModel,
    options: &'a CollectOptions,
    cancel: CancellationToken,
}

impl<'a> Collector<'a> {
    pub fn new(
        node: &'a dyn NodeClient,
        model: &'a dyn EconomicModel,
        options: &'a CollectOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node,
            model,
            options,
            cancel,
        }
    }

    /// Run the collection, streaming rows into `sink`.
    ///
    /// Rows emitted before a fatal error stay in the sink, which is flushed
    /// on every exit path.
    pub async fn run(&self, sink: &mut dyn ReportSink) -> Result<CollectSummary> {
        self.options.validate()?;

        let snapshot = resolve_snapshot(self.node, self.options.epoch).await?;
        let mut miners = list_miners_ordered(self.node, &snapshot, self.options.progress).await?;
        if let Some(after) = self.options.start_after {
            miners.retain(|miner| miner.id() > after.id());
            info!("Starting after {}, {} miners left", after, miners.len());
        }

        let dump_dir = match self.options.sectors_subdir() {
            Some(dir) => Some(create_epoch_dir(&dir)?),
            None => None,
        };
        let mut failures = match &self.options.failed_out {
            Some(path) if self.options.resumable => Some(FailureLog::create(path)?),
            _ => None,
        };

        let result = self
            .drive(&snapshot, &miners, dump_dir.as_deref(), sink, &mut failures)
            .await;

        let flushed = sink
            .flush()
            .and_then(|_| failures.as_mut().map_or(Ok(()), FailureLog::flush));
        let summary = result?;
        flushed?;

        info!(
            "Scanned {} miners: {} emitted, {} without live sectors, {} failed",
            summary.scanned, summary.emitted, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    async fn drive(
        &self,
        snapshot: &ChainSnapshot,
        miners: &[MinerId],
        dump_dir: Option<&Path>,
        sink: &mut dyn ReportSink,
        failures: &mut Option<FailureLog>,
    ) -> Result<CollectSummary> {
        let total = miners.len();
        let mut summary = CollectSummary::default();

        let mut outcomes = stream::iter(miners.iter().enumerate())
            .map(|(index, miner)| async move {
                let outcome = self.process_miner(miner, snapshot, dump_dir).await;
                (index, miner, outcome)
            })
            .buffered(self.options.concurrency);

        while let Some((index, miner, outcome)) = outcomes.next().await {
            if self.cancel.is_cancelled() {
                return Err(FipDataError::Cancelled);
            }
            summary.scanned += 1;

            match outcome {
                Ok(MinerOutcome::Skipped) => summary.skipped += 1,
                Ok(MinerOutcome::Computed {
                    record,
                    estimate,
                    counts,
                    elapsed,
                }) => {
                    if self.options.debug {
                        info!("{}: {:?}", miner, estimate);
                    }
                    sink.record(&record)?;
                    summary.emitted += 1;
                    if self.options.progress {
                        info!(
                            "#{}: {}/{}: {} ({}/{} active/live sectors, {:.1}s)",
                            summary.emitted,
                            index + 1,
                            total,
                            miner,
                            counts.active,
                            counts.live,
                            elapsed.as_secs_f64()
                        );
                    }
                }
                Err(err) if self.options.resumable && err.is_per_miner() => {
                    warn!("Skipping {} after {} failure: {}", miner, err.stage(), err);
                    if let Some(log) = failures.as_mut() {
                        log.record(miner, self.options.epoch, &err)?;
                    }
                    summary.failed += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(summary)
    }

    async fn process_miner(
        &self,
        miner: &MinerId,
        snapshot: &ChainSnapshot,
        dump_dir: Option<&Path>,
    ) -> Result<MinerOutcome> {
        if self.cancel.is_cancelled() {
            return Err(FipDataError::Cancelled);
        }
        let start = Instant::now();

        let Some(MinerSample { counts, sample }) =
            sample_live_sectors(self.node, miner, snapshot).await?
        else {
            return Ok(MinerOutcome::Skipped);
        };

        if let Some(dir) = dump_dir {
            let infos = sector_infos(self.node, miner, &sample, snapshot).await?;
            write_sector_dump(dir, miner, self.options.epoch, &infos)?;
        }

        let estimate = self
            .model
            .terminate_sectors(self.node, miner, &sample, snapshot)
            .await
            .map_err(|err| {
                if is_cancelled(&err) || self.cancel.is_cancelled() {
                    FipDataError::Cancelled
                } else {
                    FipDataError::EconomicModel {
                        subject: miner.to_string(),
                        reason: format!("{err:#}"),
                    }
                }
            })?;
        let record = MinerRecord::from_estimate(*miner, self.options.epoch, &estimate)?;

        Ok(MinerOutcome::Computed {
            record,
            estimate,
            counts,
            elapsed: start.elapsed(),
        })
    }
}
