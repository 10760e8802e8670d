//! Error types for snapshot collection and scenario simulation.

use displaydoc::Display;
use thiserror::Error;

use crate::node::RpcError;

/// Errors that abort a collection or simulation run.
///
/// Every variant is fatal under the default policy. In resumable mode the
/// per-miner variants (`SectorRetrieval`, `EconomicModel`, `NegativeAmount`)
/// are recorded and skipped instead.
#[derive(Debug, Display, Error)]
pub enum FipDataError {
    /// Configuration error: {0}
    Config(String),

    /// Could not resolve tipset at epoch {epoch}: {reason}
    SnapshotResolution { epoch: i64, reason: String },

    /// Could not list miners: {0}
    Enumeration(String),

    /// Could not retrieve sectors for {miner}: {reason}
    SectorRetrieval { miner: String, reason: String },

    /// Economic model failed for {subject}: {reason}
    EconomicModel { subject: String, reason: String },

    /// Negative {field} for {miner}: {value}
    NegativeAmount {
        miner: String,
        field: &'static str,
        value: String,
    },

    /// Scenario {0} has zero cost
    ZeroCostScenario(String),

    /// IO error: {0}
    Io(String),

    /// Run cancelled
    Cancelled,
}

impl FipDataError {
    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            FipDataError::Config(_) => "config",
            FipDataError::SnapshotResolution { .. } => "snapshot",
            FipDataError::Enumeration(_) => "enumerate",
            FipDataError::SectorRetrieval { .. } => "sectors",
            FipDataError::EconomicModel { .. } => "econ",
            FipDataError::NegativeAmount { .. } => "normalize",
            FipDataError::ZeroCostScenario(_) => "scenario",
            FipDataError::Io(_) => "io",
            FipDataError::Cancelled => "cancelled",
        }
    }

    /// Whether resumable mode may skip past this error.
    pub fn is_per_miner(&self) -> bool {
        matches!(
            self,
            FipDataError::SectorRetrieval { .. }
                | FipDataError::EconomicModel { .. }
                | FipDataError::NegativeAmount { .. }
        )
    }

    /// Wrap a transport error raised while reading a miner's sectors.
    pub fn sector_retrieval(miner: impl ToString, err: RpcError) -> Self {
        match err {
            RpcError::Cancelled => FipDataError::Cancelled,
            other => FipDataError::SectorRetrieval {
                miner: miner.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for FipDataError {
    fn from(err: std::io::Error) -> Self {
        FipDataError::Io(err.to_string())
    }
}

impl From<csv::Error> for FipDataError {
    fn from(err: csv::Error) -> Self {
        FipDataError::Io(err.to_string())
    }
}

/// Result type for collection and simulation operations.
pub type Result<T> = std::result::Result<T, FipDataError>;
