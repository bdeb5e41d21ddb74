//! Portfolio snapshot stored as TOML.
//!
//! ```toml
//! base_currency = "BTC"
//!
//! [[ratio]]
//! ticker = "BTC"
//! percent = 0.5
//! fractional = true
//!
//! [[holding]]
//! ticker = "ETH"
//! free = 10.0
//! locked = 0.5
//!
//! [[price]]
//! base = "ETH"
//! quote = "BTC"
//! price = 0.05
//! observed_at = "2018-05-19T00:00:00Z"
//! ```
//!
//! The file stands in for both the exchange (holdings, prices) and the ratio
//! configuration store. Every call re-reads the file, so edits made while a
//! process runs are picked up.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ratiolab_core::domain::{
    correct_ratios, parse_timestamp, HoldingRatio, OwnedAsset, PriceQuote, BTC, DUST_THRESHOLD,
};
use ratiolab_core::venue::{ExchangeProvider, RatioStore, VenueError, VenueResult};
use ratiolab_core::PriceIndex;

/// One `[[price]]` table. `observed_at` defaults to load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub base: String,
    pub quote: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
}

impl PriceEntry {
    fn to_quote(&self) -> VenueResult<PriceQuote> {
        let observed_at = match &self.observed_at {
            Some(raw) => parse_timestamp(raw)
                .map_err(|e| VenueError::Malformed(format!("price timestamp '{raw}': {e}")))?,
            None => Utc::now(),
        };
        Ok(PriceQuote::new(&self.base, &self.quote, self.price, observed_at))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    #[serde(default, rename = "ratio", skip_serializing_if = "Vec::is_empty")]
    pub ratios: Vec<HoldingRatio>,

    #[serde(default, rename = "holding", skip_serializing_if = "Vec::is_empty")]
    pub holdings: Vec<OwnedAsset>,

    #[serde(default, rename = "price", skip_serializing_if = "Vec::is_empty")]
    pub prices: Vec<PriceEntry>,
}

fn default_base_currency() -> String {
    BTC.to_string()
}

impl Default for PortfolioSnapshot {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            ratios: Vec::new(),
            holdings: Vec::new(),
            prices: Vec::new(),
        }
    }
}

impl PortfolioSnapshot {
    pub fn from_toml(content: &str) -> VenueResult<Self> {
        toml::from_str(content).map_err(|e| VenueError::Malformed(format!("portfolio TOML: {e}")))
    }

    pub fn to_toml(&self) -> VenueResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VenueError::Malformed(format!("serialize portfolio: {e}")))
    }

    pub fn quotes(&self) -> VenueResult<Vec<PriceQuote>> {
        self.prices.iter().map(PriceEntry::to_quote).collect()
    }

    pub fn price_index(&self) -> VenueResult<PriceIndex> {
        Ok(self.quotes()?.into_iter().collect())
    }
}

/// File-backed [`ExchangeProvider`] and [`RatioStore`].
#[derive(Debug, Clone)]
pub struct PortfolioFile {
    path: PathBuf,
}

impl PortfolioFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> VenueResult<PortfolioSnapshot> {
        let content = std::fs::read_to_string(&self.path)?;
        PortfolioSnapshot::from_toml(&content)
    }

    pub fn write(&self, snapshot: &PortfolioSnapshot) -> VenueResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, snapshot.to_toml()?)?;
        debug!(path = %self.path.display(), "portfolio written");
        Ok(())
    }
}

impl ExchangeProvider for PortfolioFile {
    fn current_prices(&self) -> VenueResult<Vec<PriceQuote>> {
        self.read()?.quotes()
    }

    fn owned_assets(&self) -> VenueResult<Vec<OwnedAsset>> {
        Ok(self
            .read()?
            .holdings
            .into_iter()
            .filter(|a| a.quantity() > DUST_THRESHOLD)
            .collect())
    }
}

impl RatioStore for PortfolioFile {
    fn load_ratios(&self) -> VenueResult<Vec<HoldingRatio>> {
        Ok(self.read()?.ratios)
    }

    fn save_ratios(&self, ratios: &[HoldingRatio]) -> VenueResult<Vec<HoldingRatio>> {
        let mut snapshot = match self.read() {
            Ok(snapshot) => snapshot,
            Err(VenueError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                PortfolioSnapshot::default()
            }
            Err(e) => return Err(e),
        };
        snapshot.ratios = correct_ratios(ratios);
        self.write(&snapshot)?;
        info!(path = %self.path.display(), count = ratios.len(), "ratios saved");
        self.load_ratios()
    }
}
