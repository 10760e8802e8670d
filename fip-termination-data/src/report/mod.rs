//! Report emitters.
//!
//! This module provides the destinations for collected data:
//! - Per-miner CSV report (stdout by default)
//! - Per-sector CSV dump, one file per miner
//! - CSV log of miners skipped in resumable mode

mod csv_report;
mod failures;
mod sectors;

pub use csv_report::CsvReport;
pub use failures::{FailureLog, FAILURE_HEADER};
pub use sectors::{create_epoch_dir, sector_row, write_sector_dump, SECTOR_DUMP_HEADER};

use crate::{aggregate::MinerRecord, error::Result};

/// Destination for per-miner records.
///
/// Records arrive in miner order and are never revised, so a sink should
/// make each one durable before returning.
pub trait ReportSink {
    /// Append one record.
    fn record(&mut self, record: &MinerRecord) -> Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
impl ReportSink for Vec<MinerRecord> {
    fn record(&mut self, record: &MinerRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Drops every record, for runs with the CSV report disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardReport;

impl ReportSink for DiscardReport {
    fn record(&mut self, _record: &MinerRecord) -> Result<()> {
        Ok(())
    }
}
