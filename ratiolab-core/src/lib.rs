//! RatioLab Core — portfolio rebalancing engine and historical simulator.
//!
//! This crate contains the arithmetic of the system:
//! - Domain types (holdings, target ratios, trading pairs, quotes)
//! - Price index keyed by typed `(base, quote)` pairs
//! - Rebalance calculator (adjustments, drift, sell-first order plans)
//! - Random ratio sampler with a deterministic RNG hierarchy
//! - Historical price stores and the cadence-stepped simulator
//! - Collaborator traits for exchanges, ratio storage and order venues
//! - Plain-text result reports

pub mod data;
pub mod domain;
pub mod price_index;
pub mod rebalance;
pub mod report;
pub mod rng;
pub mod sampler;
pub mod simulator;
pub mod venue;

pub use price_index::PriceIndex;
pub use rebalance::{AssetDrift, OrderSide, RebalanceCalculator, TradeIntent};
pub use report::{ReportFormatter, ReportWriter};
pub use sampler::RatioSampler;
pub use simulator::{
    run_simulation, AnalysisResult, HistoricalSimulator, PriceHistory, SimulationError,
};
