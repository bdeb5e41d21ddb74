//! CSV import for historical prices.
//!
//! Expected header: `base,quote,price,observed_at`. Rows may appear in any
//! order; timestamps accept RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::store::{DataError, HistoricalPriceStore, InMemoryPriceStore};
use crate::domain::{parse_timestamp, PairKey, PriceQuote};

#[derive(Debug, Deserialize)]
struct CsvRow {
    base: String,
    quote: String,
    price: f64,
    observed_at: String,
}

/// Historical prices loaded from a CSV file.
#[derive(Debug, Clone)]
pub struct CsvPriceStore {
    name: String,
    inner: InMemoryPriceStore,
}

impl CsvPriceStore {
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        let file = std::fs::File::open(path)?;
        let mut store = Self::from_reader(file)?;
        store.name = path.display().to_string();
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut inner = InMemoryPriceStore::new();

        // Line 1 is the header.
        for (line, record) in (2u64..).zip(csv_reader.deserialize::<CsvRow>()) {
            let row = record?;
            let observed_at = parse_timestamp(&row.observed_at).map_err(|e| DataError::Parse {
                line,
                message: format!("bad timestamp '{}': {e}", row.observed_at),
            })?;
            inner.insert(PriceQuote::new(&row.base, &row.quote, row.price, observed_at));
        }

        Ok(Self {
            name: "csv".to_string(),
            inner,
        })
    }

    pub fn quote_count(&self) -> usize {
        self.inner.quote_count()
    }

    pub fn pair_count(&self) -> usize {
        self.inner.pair_count()
    }
}

impl HistoricalPriceStore for CsvPriceStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_prices(
        &self,
        pair: &PairKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceQuote>, DataError> {
        self.inner.query_prices(pair, start, end)
    }
}
