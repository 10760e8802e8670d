//! Per-miner live sector sampling.
//!
//! The node has no single call returning every sector number of a miner,
//! so the sampler walks the miner's proving deadlines and unites the live
//! sets of their partitions. One partition holds at most a few thousand
//! sectors, which keeps each response small.

use tracing::{debug, warn};

use crate::{
    bitfield::SectorSample,
    error::{FipDataError, Result},
    node::NodeClient,
    types::{ChainSnapshot, MinerId, MinerSectorCount, SectorOnChainInfo},
};

/// Live sectors of one miner at one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerSample {
    pub counts: MinerSectorCount,
    pub sample: SectorSample,
}

/// Sample the live sectors of `miner`.
///
/// Returns `Ok(None)` for a miner whose live sector count is zero; such
/// miners are skipped by the aggregator. A positive count with empty
/// partitions is a retrieval error.
pub async fn sample_live_sectors(
    node: &dyn NodeClient,
    miner: &MinerId,
    snapshot: &ChainSnapshot,
) -> Result<Option<MinerSample>> {
    let tsk = snapshot.key();
    let counts = node
        .miner_sector_count(miner, tsk)
        .await
        .map_err(|e| FipDataError::sector_retrieval(miner, e))?;
    if counts.live == 0 {
        debug!("{} has no live sectors", miner);
        return Ok(None);
    }

    let deadlines = node
        .miner_deadline_count(miner, tsk)
        .await
        .map_err(|e| FipDataError::sector_retrieval(miner, e))?;

    let mut sample = SectorSample::default();
    for deadline in 0..deadlines {
        let partitions = node
            .miner_partitions(miner, deadline, tsk)
            .await
            .map_err(|e| FipDataError::sector_retrieval(miner, e))?;
        for partition in &partitions {
            sample = sample.union(&partition.live_sectors);
        }
    }

    if sample.is_empty() {
        return Err(FipDataError::SectorRetrieval {
            miner: miner.to_string(),
            reason: format!(
                "{} live sectors reported but none found in partitions",
                counts.live
            ),
        });
    }
    if sample.len() != counts.live {
        warn!(
            "{} reports {} live sectors, partitions hold {}",
            miner,
            counts.live,
            sample.len()
        );
    }

    Ok(Some(MinerSample { counts, sample }))
}

/// On-chain info for every sector in `sample`, ordered by sector number.
pub async fn sector_infos(
    node: &dyn NodeClient,
    miner: &MinerId,
    sample: &SectorSample,
    snapshot: &ChainSnapshot,
) -> Result<Vec<SectorOnChainInfo>> {
    let mut infos = node
        .miner_sectors(miner, Some(sample), snapshot.key())
        .await
        .map_err(|e| FipDataError::sector_retrieval(miner, e))?;
    infos.sort_by_key(|info| info.sector_number);
    Ok(infos)
}
