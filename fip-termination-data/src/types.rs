//! Chain data types shared by the node client and the pipeline.
//!
//! Field names follow the Lotus JSON API (`PascalCase`), so these types
//! deserialize straight from node responses.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{amount::TokenAmount, bitfield::SectorSample};

/// A chain height.
pub type ChainEpoch = i64;

/// A sector number within one miner.
pub type SectorNumber = u64;

/// Epochs per day at 30-second block time.
pub const EPOCHS_PER_DAY: ChainEpoch = 2880;

/// Bytes in one GiB.
pub const GIB: u64 = 1 << 30;

/// Largest sector number the protocol allows.
pub const MAX_SECTOR_NUMBER: SectorNumber = i64::MAX as u64;

/// ID address of a storage miner actor, e.g. `f01234`.
///
/// Miners order by their numeric ID, so `f09` sorts before `f010`. The
/// network prefix (`f` mainnet, `t` testnet) is kept for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MinerId {
    network: char,
    id: u64,
}

impl MinerId {
    /// Mainnet miner with the given actor ID.
    pub fn new(id: u64) -> Self {
        Self { network: 'f', id }
    }

    /// Miner with an explicit network prefix.
    pub fn with_network(network: char, id: u64) -> Self {
        Self { network, id }
    }

    /// Numeric actor ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Network prefix character.
    pub fn network(&self) -> char {
        self.network
    }
}

impl Ord for MinerId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.network.cmp(&other.network))
    }
}

impl PartialOrd for MinerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MinerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}0{}", self.network, self.id)
    }
}

/// Invalid miner ID address: {0}
#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display, thiserror::Error)]
pub struct MinerIdError(String);

impl FromStr for MinerId {
    type Err = MinerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let network = match chars.next() {
            Some(c @ ('f' | 't')) => c,
            _ => return Err(MinerIdError(s.to_string())),
        };
        if chars.next() != Some('0') {
            return Err(MinerIdError(s.to_string()));
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MinerIdError(s.to_string()));
        }
        let id = digits.parse().map_err(|_| MinerIdError(s.to_string()))?;
        Ok(Self { network, id })
    }
}

impl Serialize for MinerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MinerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Sort miners by ascending numeric ID.
pub fn sort_miners(miners: &mut [MinerId]) {
    miners.sort_unstable();
}

/// A CID in Lotus JSON form: `{"/": "bafy..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CidJson {
    #[serde(rename = "/")]
    pub cid: String,
}

impl fmt::Display for CidJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cid)
    }
}

/// Key identifying a tipset: the CIDs of its blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(pub Vec<CidJson>);

impl TipSetKey {
    /// The empty key, meaning "current head" to the node.
    pub fn empty() -> Self {
        Self(Vec::new())
    }
}

/// A tipset as returned by the node. Block headers are not needed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TipSet {
    pub cids: Vec<CidJson>,
    pub height: ChainEpoch,
}

impl TipSet {
    pub fn key(&self) -> TipSetKey {
        TipSetKey(self.cids.clone())
    }
}

/// An immutable handle to the chain state at one tipset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    height: ChainEpoch,
    key: TipSetKey,
}

impl ChainSnapshot {
    pub fn new(height: ChainEpoch, key: TipSetKey) -> Self {
        Self { height, key }
    }

    pub fn height(&self) -> ChainEpoch {
        self.height
    }

    pub fn key(&self) -> &TipSetKey {
        &self.key
    }
}

impl From<TipSet> for ChainSnapshot {
    fn from(ts: TipSet) -> Self {
        Self {
            height: ts.height,
            key: TipSetKey(ts.cids),
        }
    }
}

/// Sector counts reported by `StateMinerSectorCount`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MinerSectorCount {
    pub live: u64,
    pub active: u64,
    pub faulty: u64,
}

/// One partition of a miner deadline, as returned by
/// `StateMinerPartitions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Partition {
    #[serde(default)]
    pub all_sectors: SectorSample,
    #[serde(default)]
    pub faulty_sectors: SectorSample,
    #[serde(default)]
    pub live_sectors: SectorSample,
    #[serde(default)]
    pub active_sectors: SectorSample,
}

/// On-chain information about one sector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorOnChainInfo {
    pub sector_number: SectorNumber,
    pub seal_proof: i64,
    #[serde(rename = "SealedCID")]
    pub sealed_cid: CidJson,
    #[serde(rename = "DealIDs", alias = "DeprecatedDealIDs", default)]
    pub deal_ids: Option<Vec<u64>>,
    pub activation: ChainEpoch,
    pub expiration: ChainEpoch,
    #[serde(default)]
    pub deal_weight: TokenAmount,
    #[serde(default)]
    pub verified_deal_weight: TokenAmount,
    #[serde(default)]
    pub initial_pledge: TokenAmount,
    #[serde(default, deserialize_with = "nullable_amount")]
    pub expected_day_reward: TokenAmount,
    #[serde(default, deserialize_with = "nullable_amount")]
    pub expected_storage_pledge: TokenAmount,
    #[serde(default)]
    pub power_base_epoch: ChainEpoch,
    #[serde(default, deserialize_with = "nullable_amount")]
    pub replaced_day_reward: TokenAmount,
    #[serde(rename = "SectorKeyCID", default)]
    pub sector_key_cid: Option<CidJson>,
    #[serde(default)]
    pub flags: u64,
}

impl SectorOnChainInfo {
    /// Sector size in bytes implied by the seal proof type.
    ///
    /// Proof IDs come in families of five (2KiB, 8MiB, 512MiB, 32GiB,
    /// 64GiB) across the V1, V1_1, synthetic and NI-PoRep variants.
    pub fn sector_size(&self) -> Option<u64> {
        const SIZES: [u64; 5] = [2 << 10, 8 << 20, 512 << 20, 32 * GIB, 64 * GIB];
        match self.seal_proof {
            0..=19 => Some(SIZES[(self.seal_proof % 5) as usize]),
            _ => None,
        }
    }
}

// Newer nodes may send null for reward fields of sectors without them.
fn nullable_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TokenAmount, D::Error> {
    Ok(Option::<TokenAmount>::deserialize(deserializer)?.unwrap_or_default())
}
