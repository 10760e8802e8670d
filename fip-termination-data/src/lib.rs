//! Filecoin termination fee data for FIP analysis
//!
//! Snapshot tooling for evaluating changes to sector termination fees. This
//! library provides:
//!
//! - Per-miner termination economics at a fixed epoch, streamed as CSV
//! - Optional per-sector CSV dumps of every sampled sector
//! - A pledge penalty sweep over synthetic sector populations
//!
//! # Architecture
//!
//! All chain access goes through the [`NodeClient`] trait, implemented over
//! the Lotus JSON-RPC API by [`LotusClient`]. Fee computation is delegated
//! to an injected [`EconomicModel`]; [`NodeEstimator`] is the built-in
//! estimate derived from the reward and power actors.
//!
//! Miners are always processed and reported in ascending numeric ID order,
//! so a report can be compared line by line across epochs and an
//! interrupted scan can resume with `--start-after`.

pub mod aggregate;
pub mod amount;
pub mod bitfield;
pub mod config;
pub mod econ;
pub mod enumerate;
pub mod error;
pub mod node;
pub mod report;
pub mod sampler;
pub mod scenario;
pub mod types;

pub use aggregate::{CollectSummary, Collector, MinerRecord};
pub use amount::TokenAmount;
pub use config::{CollectOptions, NodeConfig};
pub use econ::{EconomicModel, NodeEstimator};
pub use error::{FipDataError, Result};
pub use node::{LotusClient, NodeClient};
pub use scenario::{reference_matrix, ScenarioSpec, ScenarioSweep};
pub use types::{ChainEpoch, ChainSnapshot, MinerId};
