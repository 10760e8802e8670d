//! Per-miner CSV report.

use std::io::Write;

use super::ReportSink;
use crate::{
    aggregate::{MinerRecord, MINER_REPORT_HEADER},
    error::{FipDataError, Result},
};

/// Writes records as CSV rows, flushing after each one so a later failure
/// cannot lose rows already reported.
pub struct CsvReport<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvReport<W> {
    /// Create a report and write the header row.
    pub fn new(writer: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(MINER_REPORT_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| FipDataError::Io(e.error().to_string()))
    }
}

impl<W: Write> ReportSink for CsvReport<W> {
    fn record(&mut self, record: &MinerRecord) -> Result<()> {
        self.writer.write_record(record.to_row())?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
