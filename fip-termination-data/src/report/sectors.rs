//! Per-sector CSV dumps.
//!
//! Each miner with live sectors gets `<dir>/<epoch>/<miner>.csv`. A dump is
//! written completely and closed before the miner's record is emitted.

use std::{
    fs::DirBuilder,
    path::{Path, PathBuf},
};

use crate::{
    error::{FipDataError, Result},
    types::{ChainEpoch, MinerId, SectorOnChainInfo},
};

/// Column names of a per-sector dump.
pub const SECTOR_DUMP_HEADER: [&str; 17] = [
    "Miner",
    "Epoch",
    "SectorNumber",
    "SealProof",
    "SealedCID",
    "DealIDs",
    "Activation",
    "Expiration",
    "DealWeight",
    "VerifiedDealWeight",
    "InitialPledge",
    "ExpectedDayReward",
    "ExpectedStoragePledge",
    "PowerBaseEpoch",
    "ReplacedDayReward",
    "SectorKeyCID",
    "Flags",
];

/// Create the dump directory (and parents) if missing.
pub fn create_epoch_dir(dir: &Path) -> Result<PathBuf> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    builder
        .create(dir)
        .map_err(|e| FipDataError::Io(format!("{}: {}", dir.display(), e)))?;
    Ok(dir.to_path_buf())
}

/// One dump row in [`SECTOR_DUMP_HEADER`] order.
pub fn sector_row(miner: &MinerId, epoch: ChainEpoch, info: &SectorOnChainInfo) -> Vec<String> {
    let deal_ids = info
        .deal_ids
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(";");
    let sector_key = info
        .sector_key_cid
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    vec![
        miner.to_string(),
        epoch.to_string(),
        info.sector_number.to_string(),
        info.seal_proof.to_string(),
        info.sealed_cid.to_string(),
        deal_ids,
        info.activation.to_string(),
        info.expiration.to_string(),
        info.deal_weight.to_string(),
        info.verified_deal_weight.to_string(),
        info.initial_pledge.to_string(),
        info.expected_day_reward.to_string(),
        info.expected_storage_pledge.to_string(),
        info.power_base_epoch.to_string(),
        info.replaced_day_reward.to_string(),
        sector_key,
        info.flags.to_string(),
    ]
}

/// Write the dump for `miner` into `dir` and close it.
pub fn write_sector_dump(
    dir: &Path,
    miner: &MinerId,
    epoch: ChainEpoch,
    sectors: &[SectorOnChainInfo],
) -> Result<PathBuf> {
    let path = dir.join(format!("{miner}.csv"));
    let io_error = |e: csv::Error| FipDataError::Io(format!("{}: {}", path.display(), e));

    let mut writer = csv::Writer::from_path(&path).map_err(io_error)?;
    writer.write_record(SECTOR_DUMP_HEADER).map_err(io_error)?;
    for info in sectors {
        writer
            .write_record(sector_row(miner, epoch, info))
            .map_err(io_error)?;
    }
    writer.flush().map_err(|e| FipDataError::Io(format!("{}: {}", path.display(), e)))?;

    tracing::debug!("Wrote {} sectors to {}", sectors.len(), path.display());
    Ok(path)
}
