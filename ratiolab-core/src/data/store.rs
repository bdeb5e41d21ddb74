//! Historical price store trait and structured error types.
//!
//! The simulator only sees `HistoricalPriceStore`, so a database-backed store
//! can replace the in-memory one without touching the simulation loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{PairKey, PriceQuote};

/// Structured error types for price storage.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parse error on line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("price store unavailable: {0}")]
    Unavailable(String),
}

/// Source of historical quotes.
pub trait HistoricalPriceStore: Send + Sync {
    /// Human-readable name of this store.
    fn name(&self) -> &str;

    /// Quotes for `pair` observed in `[start, end)`, ordered by time ascending.
    ///
    /// A pair the store has never seen is an empty result, not an error.
    fn query_prices(
        &self,
        pair: &PairKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceQuote>, DataError>;
}

/// Price series held in memory, one sorted series per pair.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceStore {
    series: HashMap<PairKey, Vec<PriceQuote>>,
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, quote: PriceQuote) {
        let series = self.series.entry(quote.pair.clone()).or_default();
        let at = series.partition_point(|q| q.observed_at <= quote.observed_at);
        series.insert(at, quote);
    }

    pub fn extend<I: IntoIterator<Item = PriceQuote>>(&mut self, quotes: I) {
        for quote in quotes {
            self.insert(quote);
        }
    }

    /// Number of pairs with at least one quote.
    pub fn pair_count(&self) -> usize {
        self.series.len()
    }

    /// Total number of stored quotes.
    pub fn quote_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PairKey> {
        self.series.keys()
    }
}

impl FromIterator<PriceQuote> for InMemoryPriceStore {
    fn from_iter<I: IntoIterator<Item = PriceQuote>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

impl HistoricalPriceStore for InMemoryPriceStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn query_prices(
        &self,
        pair: &PairKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceQuote>, DataError> {
        let Some(series) = self.series.get(pair) else {
            return Ok(Vec::new());
        };
        let from = series.partition_point(|q| q.observed_at < start);
        let to = series.partition_point(|q| q.observed_at < end);
        Ok(series[from..to.max(from)].to_vec())
    }
}
