//! OwnedAsset — a snapshot of one holding.

use serde::{Deserialize, Serialize};

/// Quantity of one asset held in the wallet.
///
/// A value type with no identity: calculators never mutate a holding, they
/// produce a new snapshot via [`OwnedAsset::adjusted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedAsset {
    pub ticker: String,
    pub free: f64,
    #[serde(default)]
    pub locked: f64,
}

impl OwnedAsset {
    pub fn new(ticker: impl Into<String>, free: f64, locked: f64) -> Self {
        Self {
            ticker: ticker.into(),
            free,
            locked,
        }
    }

    /// Total quantity held (`free + locked`).
    pub fn quantity(&self) -> f64 {
        self.free + self.locked
    }

    /// Whether this holding is for `ticker` (case-insensitive).
    pub fn is(&self, ticker: &str) -> bool {
        self.ticker.eq_ignore_ascii_case(ticker)
    }

    /// New snapshot after applying a signed quantity delta.
    ///
    /// Locked quantities are folded into `free`: the result has `locked == 0`.
    pub fn adjusted(&self, delta: f64) -> Self {
        Self {
            ticker: self.ticker.clone(),
            free: self.quantity() + delta,
            locked: 0.0,
        }
    }
}

/// First holding matching `ticker` (case-insensitive).
pub fn find_asset<'a>(assets: &'a [OwnedAsset], ticker: &str) -> Option<&'a OwnedAsset> {
    assets.iter().find(|a| a.is(ticker))
}
