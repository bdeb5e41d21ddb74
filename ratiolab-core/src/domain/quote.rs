//! PriceQuote — one observed price for a trading pair.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::pair::PairKey;

/// Price of one unit of `pair.base` expressed in `pair.quote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    #[serde(flatten)]
    pub pair: PairKey,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(base: &str, quote: &str, price: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            pair: PairKey::new(base, quote),
            price,
            observed_at,
        }
    }

    /// A quote is usable only if its price is finite and strictly positive.
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Parse an RFC 3339 timestamp, a `YYYY-MM-DD HH:MM:SS` UTC timestamp, or a
/// bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")?;
    Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::default())))
}
