//! Log of miners skipped in resumable mode.

use std::{fs::File, path::Path};

use crate::{
    error::{FipDataError, Result},
    types::{ChainEpoch, MinerId},
};

/// Column names of the failure log.
pub const FAILURE_HEADER: [&str; 4] = ["Miner", "Epoch", "Stage", "Error"];

/// CSV file listing failed miners, written row by row.
pub struct FailureLog {
    writer: csv::Writer<File>,
}

impl FailureLog {
    /// Create (or truncate) the log at `path` and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| FipDataError::Io(format!("{}: {}", path.display(), e)))?;
        writer.write_record(FAILURE_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn record(&mut self, miner: &MinerId, epoch: ChainEpoch, err: &FipDataError) -> Result<()> {
        self.writer.write_record([
            miner.to_string(),
            epoch.to_string(),
            err.stage().to_string(),
            err.to_string(),
        ])?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
