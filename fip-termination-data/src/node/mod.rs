//! Chain node access.
//!
//! [`NodeClient`] is the request/response surface the pipeline needs from a
//! Lotus-compatible node. [`LotusClient`] implements it over JSON-RPC; tests
//! substitute an in-memory fake.

mod lotus;

pub use lotus::LotusClient;

use std::time::Duration;

use async_trait::async_trait;
use displaydoc::Display;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    amount::TokenAmount,
    bitfield::SectorSample,
    types::{
        ChainEpoch, MinerId, MinerSectorCount, Partition, SectorOnChainInfo, TipSet, TipSetKey,
    },
};

/// Errors from a single node call.
#[derive(Debug, Clone, Display, Error, PartialEq, Eq)]
pub enum RpcError {
    /// Transport error: {0}
    Transport(String),

    /// HTTP error: {0}
    Http(u16),

    /// RPC error {code}: {message}
    Rpc { code: i64, message: String },

    /// Missing result in RPC response
    MissingResult,

    /// Could not decode RPC response: {0}
    Decode(String),

    /// Call timed out after {0:?}
    Timeout(Duration),

    /// Call cancelled
    Cancelled,
}

/// Result type for node calls.
pub type RpcResult<T> = Result<T, RpcError>;

/// Smoothed estimate kept by the reward and power actors.
///
/// Both fields are Q.128 fixed-point numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterEstimate {
    pub position_estimate: TokenAmount,
    pub velocity_estimate: TokenAmount,
}

/// The parts of miner actor state the economic estimator reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinerBalances {
    /// Actor balance.
    pub balance: TokenAmount,
    /// Funds locked in the vesting table.
    pub locked_funds: TokenAmount,
    pub initial_pledge: TokenAmount,
    pub fee_debt: TokenAmount,
    pub pre_commit_deposits: TokenAmount,
}

/// Capabilities required from a chain node.
///
/// Every call is read-only against the tipset named by its key.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Current heaviest tipset.
    async fn chain_head(&self) -> RpcResult<TipSet>;

    /// Tipset at `height`, or the nearest earlier one after null rounds.
    async fn tipset_by_height(&self, height: ChainEpoch) -> RpcResult<TipSet>;

    /// All storage miner actors at a tipset.
    async fn list_miners(&self, tsk: &TipSetKey) -> RpcResult<Vec<MinerId>>;

    async fn miner_sector_count(
        &self,
        miner: &MinerId,
        tsk: &TipSetKey,
    ) -> RpcResult<MinerSectorCount>;

    /// Number of proving deadlines of a miner.
    async fn miner_deadline_count(&self, miner: &MinerId, tsk: &TipSetKey) -> RpcResult<u64>;

    async fn miner_partitions(
        &self,
        miner: &MinerId,
        deadline: u64,
        tsk: &TipSetKey,
    ) -> RpcResult<Vec<Partition>>;

    /// Sector infos for the sectors in `selector`, or all sectors if `None`.
    async fn miner_sectors(
        &self,
        miner: &MinerId,
        selector: Option<&SectorSample>,
        tsk: &TipSetKey,
    ) -> RpcResult<Vec<SectorOnChainInfo>>;

    async fn miner_available_balance(
        &self,
        miner: &MinerId,
        tsk: &TipSetKey,
    ) -> RpcResult<TokenAmount>;

    async fn miner_balances(&self, miner: &MinerId, tsk: &TipSetKey) -> RpcResult<MinerBalances>;

    /// Smoothed per-epoch block reward estimate.
    async fn reward_estimate(&self, tsk: &TipSetKey) -> RpcResult<FilterEstimate>;

    /// Smoothed network quality-adjusted power estimate.
    async fn network_qa_power_estimate(&self, tsk: &TipSetKey) -> RpcResult<FilterEstimate>;

    /// Initial pledge the protocol would require for one new sector.
    async fn initial_pledge_for_sector(
        &self,
        duration: ChainEpoch,
        sector_size: u64,
        verified_size: u64,
        tsk: &TipSetKey,
    ) -> RpcResult<TokenAmount>;
}
