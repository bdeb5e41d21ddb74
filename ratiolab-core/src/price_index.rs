//! PriceIndex — read-only lookup of the latest quote per trading pair.
//!
//! Built once from a snapshot of quotes and never mutated by the calculators.
//! Lookups go through [`PairKey`], so `price("eth", "btc")` and
//! `price("ETH", "BTC")` resolve to the same entry.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::{PairKey, PriceQuote};

/// Snapshot of the most relevant quote for each pair.
#[derive(Debug, Clone, Default)]
pub struct PriceIndex {
    quotes: HashMap<PairKey, PriceQuote>,
}

impl PriceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from quotes. For repeated pairs the latest observation wins.
    pub fn from_quotes<I>(quotes: I) -> Self
    where
        I: IntoIterator<Item = PriceQuote>,
    {
        let mut index = Self::new();
        for quote in quotes {
            index.insert(quote);
        }
        index
    }

    /// Add a quote, keeping whichever of the old and new quote is more recent.
    ///
    /// Quotes with a zero, negative or non-finite price are dropped so that a
    /// price returned by the index is always safe to divide by.
    pub fn insert(&mut self, quote: PriceQuote) {
        if !quote.is_usable() {
            warn!(pair = %quote.pair, price = quote.price, "ignoring unusable price quote");
            return;
        }
        match self.quotes.get(&quote.pair) {
            Some(existing) if existing.observed_at > quote.observed_at => {}
            _ => {
                self.quotes.insert(quote.pair.clone(), quote);
            }
        }
    }

    /// The stored quote for `asset` priced in `base`, if any.
    pub fn quote(&self, asset: &str, base: &str) -> Option<&PriceQuote> {
        self.quotes.get(&PairKey::new(asset, base))
    }

    /// Price of one unit of `asset` in `base`.
    ///
    /// An asset priced in itself has an implicit price of 1.0 when no explicit
    /// quote exists.
    pub fn price(&self, asset: &str, base: &str) -> Option<f64> {
        let key = PairKey::new(asset, base);
        match self.quotes.get(&key) {
            Some(quote) => Some(quote.price),
            None if key.is_identity() => Some(1.0),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceQuote> {
        self.quotes.values()
    }
}

impl FromIterator<PriceQuote> for PriceIndex {
    fn from_iter<I: IntoIterator<Item = PriceQuote>>(iter: I) -> Self {
        Self::from_quotes(iter)
    }
}
