//! The termination-penalty economic model seam.
//!
//! The pipeline treats the economic model as an injected collaborator: for
//! the same node state and inputs it must return the same outputs and keep
//! no hidden state between calls. [`NodeEstimator`] is the implementation
//! shipped with the binary; tests use deterministic fakes.

mod node;

pub use node::NodeEstimator;

use async_trait::async_trait;

use crate::{
    amount::TokenAmount,
    bitfield::SectorSample,
    node::{NodeClient, RpcError},
    types::{ChainEpoch, ChainSnapshot, MinerId},
};

/// Economics of terminating a sampled set of a miner's sectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationEstimate {
    pub total_balance: TokenAmount,
    pub available_balance: TokenAmount,
    pub vesting_funds: TokenAmount,
    pub initial_pledge: TokenAmount,
    pub fee_debt: TokenAmount,
    /// Fee for terminating every sector of the sample now.
    pub termination_fee: TokenAmount,
    pub live_sectors: u64,
    pub faulty_sectors: u64,
}

/// Inputs of one synthetic pledge scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioParams {
    /// Amount of FIL notionally committed as pledge.
    pub notional_pledge: TokenAmount,
    /// Sector size in bytes.
    pub sector_size: u64,
    pub activation: ChainEpoch,
    pub expiration: ChainEpoch,
    /// Share of each sector filled with verified deals, in `[0, 1]`.
    pub verified_ratio: f64,
}

impl ScenarioParams {
    /// Committed duration in epochs.
    pub fn duration(&self) -> ChainEpoch {
        self.expiration - self.activation
    }

    /// Verified bytes per sector, rounded down.
    pub fn verified_size(&self) -> u64 {
        (self.sector_size as f64 * self.verified_ratio) as u64
    }
}

/// Result of one synthetic pledge scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioQuote {
    /// Pledge actually committed: whole sectors times pledge per sector.
    pub cost: TokenAmount,
    /// Fee for terminating all those sectors.
    pub penalty: TokenAmount,
    pub sectors: u64,
    pub pledge_per_sector: TokenAmount,
}

/// Termination-penalty economics.
#[async_trait]
pub trait EconomicModel: Send + Sync {
    /// Estimate balances and the fee for terminating the sampled sectors.
    async fn terminate_sectors(
        &self,
        node: &dyn NodeClient,
        miner: &MinerId,
        sample: &SectorSample,
        snapshot: &ChainSnapshot,
    ) -> anyhow::Result<TerminationEstimate>;

    /// Cost and penalty of committing `params.notional_pledge` to new
    /// sectors and terminating them at the end of their term.
    async fn penalty_on_pledge(
        &self,
        node: &dyn NodeClient,
        snapshot: &ChainSnapshot,
        params: &ScenarioParams,
    ) -> anyhow::Result<ScenarioQuote>;
}

/// Whether an economic model error was caused by run cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<RpcError>(), Some(RpcError::Cancelled)))
}
