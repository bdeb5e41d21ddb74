//! HoldingRatio — target share of the managed portfolio for one asset.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::RATIO_SUM_TOLERANCE;

/// Threshold above which [`correct_ratios`] rescales a ratio set.
const CORRECTION_TOLERANCE: f64 = 1e-5;

/// Desired share of total managed value for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRatio {
    pub ticker: String,
    /// Fraction of total managed value, in `[0, 1]`.
    pub percent: f64,
    /// Whether the venue accepts fractional quantities of this asset.
    /// Non-fractional adjustments are rounded to whole units.
    #[serde(default)]
    pub fractional: bool,
}

impl HoldingRatio {
    pub fn new(ticker: impl Into<String>, percent: f64, fractional: bool) -> Self {
        Self {
            ticker: ticker.into(),
            percent,
            fractional,
        }
    }

    pub fn is(&self, ticker: &str) -> bool {
        self.ticker.eq_ignore_ascii_case(ticker)
    }
}

/// A ratio set that cannot be used for a calculation.
///
/// Configuration errors are fatal to the calling operation and never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no holding ratios configured")]
    EmptyRatios,

    #[error("holding ratios should add up to 1 (got {total:.6})")]
    RatioSum { total: f64 },

    #[error("ticker '{0}' appears more than once in the holding ratios")]
    DuplicateTicker(String),

    #[error("ratio for '{ticker}' must be within [0, 1] (got {percent})")]
    InvalidPercent { ticker: String, percent: f64 },

    #[error("rebalancing cadence must be at least one day (got {0})")]
    InvalidCadence(u32),

    #[error("simulation start must be before its end")]
    InvalidRange,

    #[error("there appear to be no owned assets")]
    NoHoldings,
}

/// Check that a ratio set is usable: non-empty, unique tickers, every percent
/// in `[0, 1]`, and a sum of 1.0 within [`RATIO_SUM_TOLERANCE`].
pub fn validate_ratios(ratios: &[HoldingRatio]) -> Result<(), ConfigError> {
    if ratios.is_empty() {
        return Err(ConfigError::EmptyRatios);
    }

    let mut seen = HashSet::new();
    for ratio in ratios {
        if !seen.insert(ratio.ticker.to_ascii_uppercase()) {
            return Err(ConfigError::DuplicateTicker(ratio.ticker.clone()));
        }
        if !(0.0..=1.0).contains(&ratio.percent) {
            return Err(ConfigError::InvalidPercent {
                ticker: ratio.ticker.clone(),
                percent: ratio.percent,
            });
        }
    }

    let total: f64 = ratios.iter().map(|r| r.percent).sum();
    if (1.0 - total).abs() > RATIO_SUM_TOLERANCE {
        return Err(ConfigError::RatioSum { total });
    }
    Ok(())
}

/// Rescale a ratio set so it sums to 1.0.
///
/// Sets already within `1e-5` of 1.0, and sets whose sum is not positive, are
/// returned unchanged.
pub fn correct_ratios(ratios: &[HoldingRatio]) -> Vec<HoldingRatio> {
    let total: f64 = ratios.iter().map(|r| r.percent).sum();
    if (1.0 - total).abs() <= CORRECTION_TOLERANCE || total <= 0.0 {
        return ratios.to_vec();
    }
    ratios
        .iter()
        .map(|r| HoldingRatio {
            percent: r.percent / total,
            ..r.clone()
        })
        .collect()
}

/// First ratio matching `ticker` (case-insensitive).
pub fn find_ratio<'a>(ratios: &'a [HoldingRatio], ticker: &str) -> Option<&'a HoldingRatio> {
    ratios.iter().find(|r| r.is(ticker))
}
