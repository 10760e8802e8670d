//! Snapshot resolution and ordered miner enumeration.

use std::time::Instant;

use tracing::{info, warn};

use crate::{
    error::{FipDataError, Result},
    node::{NodeClient, RpcError},
    types::{sort_miners, ChainEpoch, ChainSnapshot, MinerId},
};

/// Resolve the snapshot at `epoch`, or at the nearest earlier tipset when
/// `epoch` was a null round.
pub async fn resolve_snapshot(node: &dyn NodeClient, epoch: ChainEpoch) -> Result<ChainSnapshot> {
    let failed = |reason: String| FipDataError::SnapshotResolution { epoch, reason };

    if epoch < 0 {
        return Err(failed("epoch is before genesis".into()));
    }

    let head = node.chain_head().await.map_err(|e| match e {
        RpcError::Cancelled => FipDataError::Cancelled,
        other => failed(format!("could not read chain head: {other}")),
    })?;
    if epoch > head.height {
        return Err(failed(format!(
            "epoch is above the chain head at {}",
            head.height
        )));
    }

    let tipset = node.tipset_by_height(epoch).await.map_err(|e| match e {
        RpcError::Cancelled => FipDataError::Cancelled,
        other => failed(other.to_string()),
    })?;
    if tipset.height > epoch {
        return Err(failed(format!(
            "node returned a later tipset at {}",
            tipset.height
        )));
    }
    if tipset.height < epoch {
        warn!(
            "Epoch {} is a null round, using tipset at {}",
            epoch, tipset.height
        );
    }

    Ok(ChainSnapshot::from(tipset))
}

/// All miner actors at `snapshot`, in ascending numeric ID order.
///
/// With `progress` set the listing is bracketed by progress log lines.
pub async fn list_miners_ordered(
    node: &dyn NodeClient,
    snapshot: &ChainSnapshot,
    progress: bool,
) -> Result<Vec<MinerId>> {
    if progress {
        info!("Getting list of miners...");
    }
    let start = Instant::now();

    let mut miners = node
        .list_miners(snapshot.key())
        .await
        .map_err(|e| match e {
            RpcError::Cancelled => FipDataError::Cancelled,
            other => FipDataError::Enumeration(other.to_string()),
        })?;
    sort_miners(&mut miners);
    miners.dedup();

    if progress {
        info!(
            "Found {} miners in {:.1} seconds",
            miners.len(),
            start.elapsed().as_secs_f64()
        );
    }
    Ok(miners)
}
