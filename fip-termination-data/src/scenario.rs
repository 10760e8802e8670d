//! The `penalty-on-pledge` scenario sweep.
//!
//! Each scenario commits a notional pledge to new sectors of one size,
//! duration and verified share, activated at the snapshot height, and asks
//! the economic model what terminating them at the end of their term would
//! cost. Scenarios are evaluated and printed in list order.

use std::{fmt, io::Write};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    amount::TokenAmount,
    econ::{is_cancelled, EconomicModel, ScenarioParams, ScenarioQuote},
    enumerate::resolve_snapshot,
    error::{FipDataError, Result},
    node::NodeClient,
    types::{ChainEpoch, ChainSnapshot, EPOCHS_PER_DAY, GIB},
};

/// FIL committed in every scenario.
pub const NOTIONAL_PLEDGE_FIL: u64 = 1000;

const REFERENCE_DAYS: [i64; 7] = [180, 360, 540, 720, 900, 1080, 1260];
const REFERENCE_SIZES_GIB: [u64; 2] = [32, 64];
const REFERENCE_VERIFIED_RATIOS: [f64; 2] = [0.0, 1.0];

/// One synthetic sector population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioSpec {
    pub sector_size_gib: u64,
    pub days: i64,
    /// Share of each sector holding verified deals, in `[0, 1]`.
    pub verified_ratio: f64,
}

impl ScenarioSpec {
    pub fn new(sector_size_gib: u64, days: i64, verified_ratio: f64) -> Self {
        Self {
            sector_size_gib,
            days,
            verified_ratio,
        }
    }

    /// Sector size in bytes.
    pub fn sector_size(&self) -> u64 {
        self.sector_size_gib.saturating_mul(GIB)
    }

    /// Committed duration in epochs.
    pub fn duration(&self) -> ChainEpoch {
        self.days.saturating_mul(EPOCHS_PER_DAY)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sector_size_gib == 0 || self.sector_size_gib.checked_mul(GIB).is_none() {
            return Err(FipDataError::Config(format!(
                "invalid sector size {}GiB",
                self.sector_size_gib
            )));
        }
        if self.days <= 0 || self.days.checked_mul(EPOCHS_PER_DAY).is_none() {
            return Err(FipDataError::Config(format!(
                "invalid duration {} days",
                self.days
            )));
        }
        if !(0.0..=1.0).contains(&self.verified_ratio) {
            return Err(FipDataError::Config(format!(
                "verified ratio {} is outside [0, 1]",
                self.verified_ratio
            )));
        }
        Ok(())
    }

    /// Model inputs for sectors activated at `activation`.
    pub fn params(&self, activation: ChainEpoch, notional_pledge: &TokenAmount) -> ScenarioParams {
        ScenarioParams {
            notional_pledge: notional_pledge.clone(),
            sector_size: self.sector_size(),
            activation,
            expiration: activation + self.duration(),
            verified_ratio: self.verified_ratio,
        }
    }
}

impl fmt::Display for ScenarioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}GiB, {} days, {:.1}% verified",
            self.sector_size_gib,
            self.days,
            self.verified_ratio * 100.0
        )
    }
}

/// The 28 reference scenarios: duration, then size, then verified share.
pub fn reference_matrix() -> Vec<ScenarioSpec> {
    let mut specs = Vec::with_capacity(
        REFERENCE_DAYS.len() * REFERENCE_SIZES_GIB.len() * REFERENCE_VERIFIED_RATIOS.len(),
    );
    for days in REFERENCE_DAYS {
        for size in REFERENCE_SIZES_GIB {
            for ratio in REFERENCE_VERIFIED_RATIOS {
                specs.push(ScenarioSpec::new(size, days, ratio));
            }
        }
    }
    specs
}

/// A scenario and its evaluated quote.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub spec: ScenarioSpec,
    pub quote: ScenarioQuote,
    /// `penalty / cost * 100`
    pub penalty_pct: f64,
}

impl ScenarioOutcome {
    /// Pair a spec with its quote.
    ///
    /// A zero-cost quote is an error, as is a negative penalty or pledge.
    pub fn new(spec: ScenarioSpec, quote: ScenarioQuote) -> Result<Self> {
        if !quote.cost.is_positive() {
            return Err(FipDataError::ZeroCostScenario(spec.to_string()));
        }
        let amounts = [
            ("penalty", &quote.penalty),
            ("pledge per sector", &quote.pledge_per_sector),
        ];
        for (field, value) in amounts {
            if value.is_negative() {
                return Err(FipDataError::NegativeAmount {
                    miner: spec.to_string(),
                    field,
                    value: value.to_string(),
                });
            }
        }
        let penalty_pct = quote.penalty.ratio_per(&quote.cost).to_fil_f64() * 100.0;
        Ok(Self {
            spec,
            quote,
            penalty_pct,
        })
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2}% penalty ({} FIL / {} FIL, {} sectors, pledge: {} FIL/sector)",
            self.spec,
            self.penalty_pct,
            self.quote.penalty.fil_string(1),
            self.quote.cost.fil_string(1),
            self.quote.sectors,
            self.quote.pledge_per_sector.fil_string(2)
        )
    }
}

/// Evaluates a list of scenarios against one snapshot.
pub struct ScenarioSweep<'a> {
    node: &'a dyn NodeClient,
    model: &'a dyn EconomicModel,
    specs: Vec<ScenarioSpec>,
    notional_pledge: TokenAmount,
    cancel: CancellationToken,
}

impl<'a> ScenarioSweep<'a> {
    /// Sweep over `specs` with the default notional pledge.
    pub fn new(
        node: &'a dyn NodeClient,
        model: &'a dyn EconomicModel,
        specs: Vec<ScenarioSpec>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        for spec in &specs {
            spec.validate()?;
        }
        Ok(Self {
            node,
            model,
            specs,
            notional_pledge: TokenAmount::from_whole(NOTIONAL_PLEDGE_FIL),
            cancel,
        })
    }

    pub fn with_notional_pledge(mut self, pledge: TokenAmount) -> Self {
        self.notional_pledge = pledge;
        self
    }

    pub fn specs(&self) -> &[ScenarioSpec] {
        &self.specs
    }

    /// Resolve `epoch` and run every scenario, writing one line each.
    pub async fn run<W: Write>(
        &self,
        epoch: ChainEpoch,
        out: &mut W,
    ) -> Result<Vec<ScenarioOutcome>> {
        let snapshot = resolve_snapshot(self.node, epoch).await?;
        self.run_at(&snapshot, out).await
    }

    /// Run every scenario against an already resolved snapshot.
    pub async fn run_at<W: Write>(
        &self,
        snapshot: &ChainSnapshot,
        out: &mut W,
    ) -> Result<Vec<ScenarioOutcome>> {
        let mut outcomes = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            if self.cancel.is_cancelled() {
                return Err(FipDataError::Cancelled);
            }

            let params = spec.params(snapshot.height(), &self.notional_pledge);
            debug!("Evaluating {}: {:?}", spec, params);
            let quote = self
                .model
                .penalty_on_pledge(self.node, snapshot, &params)
                .await
                .map_err(|err| {
                    if is_cancelled(&err) || self.cancel.is_cancelled() {
                        FipDataError::Cancelled
                    } else {
                        FipDataError::EconomicModel {
                            subject: spec.to_string(),
                            reason: format!("{err:#}"),
                        }
                    }
                })?;

            let outcome = ScenarioOutcome::new(*spec, quote)?;
            writeln!(out, "{outcome}")?;
            out.flush()?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
