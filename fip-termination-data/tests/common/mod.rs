//! Common test utilities for pipeline integration tests.
//!
//! [`FakeNode`] serves a small in-memory chain through the [`NodeClient`]
//! trait and [`FakeModel`] is a deterministic economic model, so tests can
//! drive the collector and the scenario sweep without a Lotus node.
//!
//! # Example
//!
//! ```ignore
//! let node = FakeNode::new(1000).with_miner(9, &[1, 2, 3]);
//! let model = FakeModel::default();
//! let options = collect_options(1000);
//! let mut rows = Vec::new();
//! Collector::new(&node, &model, &options, CancellationToken::new())
//!     .run(&mut rows)
//!     .await?;
//! ```

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use fip_termination_data::{
    amount::TokenAmount,
    bitfield::SectorSample,
    config::CollectOptions,
    econ::{EconomicModel, ScenarioParams, ScenarioQuote, TerminationEstimate},
    node::{FilterEstimate, MinerBalances, NodeClient, RpcError, RpcResult},
    types::{
        ChainEpoch, ChainSnapshot, CidJson, MinerId, MinerSectorCount, Partition,
        SectorOnChainInfo, TipSet, TipSetKey, EPOCHS_PER_DAY,
    },
};

/// Sectors per fake partition.
const PARTITION_SIZE: usize = 4;

/// Fake proving deadlines per miner.
const DEADLINES: u64 = 3;

/// One miner of the fake chain.
#[derive(Debug, Clone, Default)]
pub struct FakeMiner {
    pub live: Vec<u64>,
    pub active: u64,
    pub faulty: u64,
    /// Fail sector retrieval with this error
    pub sector_error: Option<RpcError>,
    /// Delay each partition response by this long
    pub delay: Duration,
    /// Answer partition queries with no partitions
    pub empty_partitions: bool,
}

/// In-memory chain node.
#[derive(Debug, Default)]
pub struct FakeNode {
    pub head: ChainEpoch,
    pub null_rounds: HashSet<ChainEpoch>,
    /// Miner list in the order the node returns it
    pub listing: Vec<MinerId>,
    pub miners: HashMap<MinerId, FakeMiner>,
    pub list_error: Option<RpcError>,
    /// Miners whose sector infos were requested, in call order
    pub sector_requests: Mutex<Vec<MinerId>>,
}

impl FakeNode {
    pub fn new(head: ChainEpoch) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    /// Add a miner with the given live sectors, all active.
    pub fn with_miner(mut self, id: u64, live: &[u64]) -> Self {
        let miner = MinerId::new(id);
        self.listing.push(miner);
        self.miners.insert(
            miner,
            FakeMiner {
                live: live.to_vec(),
                active: live.len() as u64,
                ..Default::default()
            },
        );
        self
    }

    /// Add a miner whose partition queries fail.
    pub fn with_failing_miner(mut self, id: u64, error: RpcError) -> Self {
        self = self.with_miner(id, &[1, 2, 3]);
        if let Some(miner) = self.miners.get_mut(&MinerId::new(id)) {
            miner.sector_error = Some(error);
        }
        self
    }

    /// Add a miner whose sector count is positive but whose deadlines hold
    /// no partitions.
    pub fn with_empty_partitions(mut self, id: u64, live: &[u64]) -> Self {
        self = self.with_miner(id, live);
        if let Some(miner) = self.miners.get_mut(&MinerId::new(id)) {
            miner.empty_partitions = true;
        }
        self
    }

    pub fn with_delay(mut self, id: u64, delay: Duration) -> Self {
        if let Some(miner) = self.miners.get_mut(&MinerId::new(id)) {
            miner.delay = delay;
        }
        self
    }

    pub fn with_null_round(mut self, epoch: ChainEpoch) -> Self {
        self.null_rounds.insert(epoch);
        self
    }

    fn tipset(height: ChainEpoch) -> TipSet {
        TipSet {
            cids: vec![CidJson {
                cid: format!("bafy2tipset{height}"),
            }],
            height,
        }
    }

    fn miner(&self, miner: &MinerId) -> RpcResult<&FakeMiner> {
        self.miners.get(miner).ok_or_else(|| RpcError::Rpc {
            code: 1,
            message: format!("actor not found: {miner}"),
        })
    }
}

pub fn sector_info(number: u64) -> SectorOnChainInfo {
    SectorOnChainInfo {
        sector_number: number,
        seal_proof: 8,
        sealed_cid: CidJson {
            cid: format!("bagboea4b5sealed{number}"),
        },
        deal_ids: Some(vec![number * 10]),
        activation: 100,
        expiration: 100 + 540 * EPOCHS_PER_DAY,
        deal_weight: TokenAmount::zero(),
        verified_deal_weight: TokenAmount::zero(),
        initial_pledge: TokenAmount::from_whole(5),
        expected_day_reward: TokenAmount::from(1000),
        expected_storage_pledge: TokenAmount::from(20_000),
        power_base_epoch: 100,
        replaced_day_reward: TokenAmount::zero(),
        sector_key_cid: None,
        flags: 0,
    }
}

#[async_trait]
impl NodeClient for FakeNode {
    async fn chain_head(&self) -> RpcResult<TipSet> {
        Ok(Self::tipset(self.head))
    }

    async fn tipset_by_height(&self, height: ChainEpoch) -> RpcResult<TipSet> {
        let mut height = height.min(self.head);
        while self.null_rounds.contains(&height) {
            height -= 1;
        }
        Ok(Self::tipset(height))
    }

    async fn list_miners(&self, _tsk: &TipSetKey) -> RpcResult<Vec<MinerId>> {
        match &self.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.listing.clone()),
        }
    }

    async fn miner_sector_count(
        &self,
        miner: &MinerId,
        _tsk: &TipSetKey,
    ) -> RpcResult<MinerSectorCount> {
        let fake = self.miner(miner)?;
        Ok(MinerSectorCount {
            live: fake.live.len() as u64,
            active: fake.active,
            faulty: fake.faulty,
        })
    }

    async fn miner_deadline_count(&self, miner: &MinerId, _tsk: &TipSetKey) -> RpcResult<u64> {
        self.miner(miner)?;
        Ok(DEADLINES)
    }

    async fn miner_partitions(
        &self,
        miner: &MinerId,
        deadline: u64,
        _tsk: &TipSetKey,
    ) -> RpcResult<Vec<Partition>> {
        let fake = self.miner(miner)?;
        if !fake.delay.is_zero() {
            tokio::time::sleep(fake.delay).await;
        }
        if let Some(err) = &fake.sector_error {
            return Err(err.clone());
        }
        if fake.empty_partitions {
            return Ok(Vec::new());
        }

        // Sectors are dealt round-robin over deadlines, then chunked into
        // partitions.
        let in_deadline: Vec<u64> = fake
            .live
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as u64 % DEADLINES == deadline)
            .map(|(_, &n)| n)
            .collect();
        Ok(in_deadline
            .chunks(PARTITION_SIZE)
            .map(|chunk| {
                let live = SectorSample::from_sectors(chunk.iter().copied())
                    .expect("valid fake sectors");
                Partition {
                    all_sectors: live.clone(),
                    faulty_sectors: SectorSample::default(),
                    live_sectors: live.clone(),
                    active_sectors: live,
                }
            })
            .collect())
    }

    async fn miner_sectors(
        &self,
        miner: &MinerId,
        selector: Option<&SectorSample>,
        _tsk: &TipSetKey,
    ) -> RpcResult<Vec<SectorOnChainInfo>> {
        let fake = self.miner(miner)?;
        self.sector_requests.lock().unwrap().push(*miner);
        Ok(fake
            .live
            .iter()
            .copied()
            .filter(|&n| selector.is_none_or(|s| s.contains(n)))
            .map(sector_info)
            .collect())
    }

    async fn miner_available_balance(
        &self,
        miner: &MinerId,
        _tsk: &TipSetKey,
    ) -> RpcResult<TokenAmount> {
        self.miner(miner)?;
        Ok(TokenAmount::from_whole(1))
    }

    async fn miner_balances(&self, miner: &MinerId, _tsk: &TipSetKey) -> RpcResult<MinerBalances> {
        self.miner(miner)?;
        Ok(MinerBalances::default())
    }

    async fn reward_estimate(&self, _tsk: &TipSetKey) -> RpcResult<FilterEstimate> {
        Ok(FilterEstimate::default())
    }

    async fn network_qa_power_estimate(&self, _tsk: &TipSetKey) -> RpcResult<FilterEstimate> {
        Ok(FilterEstimate::default())
    }

    async fn initial_pledge_for_sector(
        &self,
        _duration: ChainEpoch,
        _sector_size: u64,
        _verified_size: u64,
        _tsk: &TipSetKey,
    ) -> RpcResult<TokenAmount> {
        Ok(TokenAmount::from_whole(5))
    }
}

/// Deterministic economic model.
///
/// A miner with `n` sampled sectors gets `10n` FIL of pledge and an `n` FIL
/// termination fee. A scenario of `d` days costs 100 FIL and is penalized
/// `5 * d / 180` FIL.
#[derive(Debug, Default)]
pub struct FakeModel {
    /// Fail the model for this miner
    pub fail_for: Option<MinerId>,
    /// Report a negative fee for this miner
    pub negative_for: Option<MinerId>,
    /// Quote a zero cost for every scenario
    pub zero_cost: bool,
    /// Miners the model was called for, in call order
    pub calls: Mutex<Vec<MinerId>>,
    /// Scenario inputs, in call order
    pub scenarios: Mutex<Vec<ScenarioParams>>,
}

#[async_trait]
impl EconomicModel for FakeModel {
    async fn terminate_sectors(
        &self,
        _node: &dyn NodeClient,
        miner: &MinerId,
        sample: &SectorSample,
        _snapshot: &ChainSnapshot,
    ) -> anyhow::Result<TerminationEstimate> {
        self.calls.lock().unwrap().push(*miner);
        if self.fail_for == Some(*miner) {
            anyhow::bail!("vesting table unreadable");
        }

        let sectors = sample.len();
        let fee = if self.negative_for == Some(*miner) {
            TokenAmount::from_atto(-1)
        } else {
            TokenAmount::from_whole(sectors)
        };
        Ok(TerminationEstimate {
            total_balance: TokenAmount::from_whole(20 * sectors),
            available_balance: TokenAmount::from_whole(sectors),
            vesting_funds: TokenAmount::from_whole(2 * sectors),
            initial_pledge: TokenAmount::from_whole(10 * sectors),
            fee_debt: TokenAmount::zero(),
            termination_fee: fee,
            live_sectors: sectors,
            faulty_sectors: 0,
        })
    }

    async fn penalty_on_pledge(
        &self,
        _node: &dyn NodeClient,
        _snapshot: &ChainSnapshot,
        params: &ScenarioParams,
    ) -> anyhow::Result<ScenarioQuote> {
        self.scenarios.lock().unwrap().push(params.clone());
        if self.zero_cost {
            return Ok(ScenarioQuote::default());
        }

        let days = (params.duration() / EPOCHS_PER_DAY) as u64;
        let penalty = TokenAmount::from_whole(5).mul_u64(days);
        Ok(ScenarioQuote {
            cost: TokenAmount::from_whole(100),
            penalty: TokenAmount::from_atto(penalty.atto() / 180u32),
            sectors: 20,
            pledge_per_sector: TokenAmount::from_whole(5),
        })
    }
}

/// Collect options with progress logging off.
pub fn collect_options(epoch: ChainEpoch) -> CollectOptions {
    CollectOptions {
        epoch,
        progress: false,
        ..Default::default()
    }
}

/// Miner IDs of the given records.
pub fn miner_ids(rows: &[fip_termination_data::MinerRecord]) -> Vec<u64> {
    rows.iter().map(|r| r.miner.id()).collect()
}

/// Log output captured from the current thread.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route `info` and above logs of the current thread into a buffer until
/// the guard drops.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
