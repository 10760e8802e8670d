//! Reward-based termination fee estimator backed by live node state.

use anyhow::{bail, Context};
use async_trait::async_trait;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use tracing::debug;

use super::{EconomicModel, ScenarioParams, ScenarioQuote, TerminationEstimate};
use crate::{
    amount::TokenAmount,
    bitfield::SectorSample,
    node::{FilterEstimate, NodeClient},
    types::{ChainEpoch, ChainSnapshot, MinerId, SectorOnChainInfo, EPOCHS_PER_DAY},
};

/// Fractional bits of the smoothed filter estimates.
const PRECISION: usize = 128;

/// Days of expected reward a terminated sector's age is capped at.
const TERMINATION_LIFETIME_CAP_DAYS: ChainEpoch = 140;

/// Projection window of the lower fee bound: 3.5 days.
const LOWER_BOUND_PROJECTION: ChainEpoch = EPOCHS_PER_DAY * 7 / 2;

/// Storage pledge projection window: 20 days.
const STORAGE_PLEDGE_PROJECTION: ChainEpoch = EPOCHS_PER_DAY * 20;

/// Verified deal space earns ten times the power of committed capacity.
const VERIFIED_EXTRA_MULTIPLIER: u64 = 9;

/// Estimates termination economics from the node's reward and power
/// actors and each sector's recorded rewards.
///
/// The per-sector fee is the larger of 3.5 days of projected reward and the
/// sector's storage pledge plus half its expected reward over a lifetime
/// capped at 140 days. Projections use only the position part of the
/// smoothed reward and network power estimates, so results are close to,
/// but not exactly, what the actor would charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeEstimator;

impl NodeEstimator {
    pub fn new() -> Self {
        Self
    }
}

/// Network-level inputs of the fee formula at one snapshot.
#[derive(Debug, Clone)]
struct RewardProjection {
    /// attoFIL minted per epoch
    reward_per_epoch: BigInt,
    /// Network quality-adjusted power in bytes
    network_qa_power: BigInt,
}

impl RewardProjection {
    fn new(reward: &FilterEstimate, power: &FilterEstimate) -> Self {
        Self {
            reward_per_epoch: reward.position_estimate.atto() >> PRECISION,
            network_qa_power: power.position_estimate.atto() >> PRECISION,
        }
    }

    /// Reward expected for `qa_power` bytes over `epochs`.
    fn expected_reward(&self, qa_power: &BigInt, epochs: ChainEpoch) -> BigInt {
        if !self.network_qa_power.is_positive() {
            return self.reward_per_epoch.clone();
        }
        &self.reward_per_epoch * qa_power * BigInt::from(epochs) / &self.network_qa_power
    }

    /// Fee for terminating a sector at `age` epochs since its power base.
    fn termination_fee(&self, sector: &SectorTerms) -> BigInt {
        let cap = TERMINATION_LIFETIME_CAP_DAYS * EPOCHS_PER_DAY;
        let capped_age = sector.age.clamp(0, cap);
        let replaced_age = sector.replaced_age.clamp(0, cap - capped_age);

        let expected = &sector.day_reward * BigInt::from(capped_age)
            + &sector.replaced_day_reward * BigInt::from(replaced_age);
        let penalized = expected / 2;
        let age_based = &sector.storage_pledge + penalized / BigInt::from(EPOCHS_PER_DAY);

        let lower_bound = self.expected_reward(&sector.qa_power, LOWER_BOUND_PROJECTION);
        lower_bound.max(age_based)
    }
}

/// The per-sector inputs of the fee formula.
#[derive(Debug, Clone)]
struct SectorTerms {
    qa_power: BigInt,
    day_reward: BigInt,
    storage_pledge: BigInt,
    age: ChainEpoch,
    replaced_day_reward: BigInt,
    replaced_age: ChainEpoch,
}

impl SectorTerms {
    fn from_info(info: &SectorOnChainInfo, sector_size: u64, now: ChainEpoch) -> Self {
        let duration = (info.expiration - info.activation).max(1);
        let verified_bytes = info.verified_deal_weight.atto() / BigInt::from(duration);
        Self {
            qa_power: BigInt::from(sector_size)
                + verified_bytes * BigInt::from(VERIFIED_EXTRA_MULTIPLIER),
            day_reward: info.expected_day_reward.atto().clone(),
            storage_pledge: info.expected_storage_pledge.atto().clone(),
            age: now - info.power_base_epoch,
            replaced_day_reward: info.replaced_day_reward.atto().clone(),
            replaced_age: info.power_base_epoch - info.activation,
        }
    }

    /// A new sector with `params`, terminated at the end of its term.
    fn scenario(projection: &RewardProjection, params: &ScenarioParams) -> Self {
        let qa_power = BigInt::from(params.sector_size)
            + BigInt::from(params.verified_size()) * BigInt::from(VERIFIED_EXTRA_MULTIPLIER);
        Self {
            day_reward: projection.expected_reward(&qa_power, EPOCHS_PER_DAY),
            storage_pledge: projection.expected_reward(&qa_power, STORAGE_PLEDGE_PROJECTION),
            qa_power,
            age: params.duration(),
            replaced_day_reward: BigInt::zero(),
            replaced_age: 0,
        }
    }
}

async fn projection(
    node: &dyn NodeClient,
    snapshot: &ChainSnapshot,
) -> anyhow::Result<RewardProjection> {
    let reward = node
        .reward_estimate(snapshot.key())
        .await
        .context("reading reward actor")?;
    let power = node
        .network_qa_power_estimate(snapshot.key())
        .await
        .context("reading power actor")?;
    Ok(RewardProjection::new(&reward, &power))
}

#[async_trait]
impl EconomicModel for NodeEstimator {
    async fn terminate_sectors(
        &self,
        node: &dyn NodeClient,
        miner: &MinerId,
        sample: &SectorSample,
        snapshot: &ChainSnapshot,
    ) -> anyhow::Result<TerminationEstimate> {
        let tsk = snapshot.key();
        let balances = node
            .miner_balances(miner, tsk)
            .await
            .context("reading miner state")?;
        let available_balance = node
            .miner_available_balance(miner, tsk)
            .await
            .context("reading available balance")?;
        let counts = node
            .miner_sector_count(miner, tsk)
            .await
            .context("reading sector counts")?;
        let projection = projection(node, snapshot).await?;
        let infos = node
            .miner_sectors(miner, Some(sample), tsk)
            .await
            .context("reading sector infos")?;

        if infos.len() as u64 != sample.len() {
            bail!(
                "requested {} sectors, node returned {}",
                sample.len(),
                infos.len()
            );
        }

        let mut fee = BigInt::zero();
        for info in &infos {
            let Some(size) = info.sector_size() else {
                bail!(
                    "sector {} has unknown seal proof {}",
                    info.sector_number,
                    info.seal_proof
                );
            };
            let terms = SectorTerms::from_info(info, size, snapshot.height());
            fee += projection.termination_fee(&terms);
        }
        debug!("{}: fee {} over {} sectors", miner, fee, infos.len());

        Ok(TerminationEstimate {
            total_balance: balances.balance,
            available_balance,
            vesting_funds: balances.locked_funds,
            initial_pledge: balances.initial_pledge,
            fee_debt: balances.fee_debt,
            termination_fee: TokenAmount::from_atto(fee),
            live_sectors: sample.len(),
            faulty_sectors: counts.faulty,
        })
    }

    async fn penalty_on_pledge(
        &self,
        node: &dyn NodeClient,
        snapshot: &ChainSnapshot,
        params: &ScenarioParams,
    ) -> anyhow::Result<ScenarioQuote> {
        if params.duration() <= 0 {
            bail!("expiration {} is not after activation {}", params.expiration, params.activation);
        }

        let pledge_per_sector = node
            .initial_pledge_for_sector(
                params.duration(),
                params.sector_size,
                params.verified_size(),
                snapshot.key(),
            )
            .await
            .context("reading initial pledge for sector")?;
        let Some(sectors) = params.notional_pledge.div_floor_count(&pledge_per_sector) else {
            bail!("node returned non-positive pledge {pledge_per_sector} per sector");
        };

        let projection = projection(node, snapshot).await?;
        let fee = projection.termination_fee(&SectorTerms::scenario(&projection, params));

        Ok(ScenarioQuote {
            cost: pledge_per_sector.mul_u64(sectors),
            penalty: TokenAmount::from_atto(fee).mul_u64(sectors),
            sectors,
            pledge_per_sector,
        })
    }
}
