//! Domain types for ratiolab: holdings, target ratios, trading pairs, price quotes.

pub mod asset;
pub mod pair;
pub mod quote;
pub mod ratio;

use std::collections::BTreeMap;

pub use asset::{find_asset, OwnedAsset};
pub use pair::PairKey;
pub use quote::{parse_timestamp, PriceQuote};
pub use ratio::{correct_ratios, find_ratio, validate_ratios, ConfigError, HoldingRatio};

/// Ticker type alias
pub type Ticker = String;

/// Signed quantity delta per asset ticker: positive = buy, negative = sell.
///
/// A `BTreeMap` so that iteration (and therefore order planning and report
/// output) is stable across runs.
pub type AdjustmentMap = BTreeMap<Ticker, f64>;

/// Currency every rebalance calculation is denominated in.
pub const BTC: &str = "BTC";

/// Fiat dollar ticker as requested by callers.
pub const USD: &str = "USD";

/// Stable-coin that stands in for USD when looking up `BTC -> USD`.
pub const USD_PROXY: &str = "USDT";

/// Adjustments with `|delta| <= DUST_THRESHOLD` units are never traded.
pub const DUST_THRESHOLD: f64 = 0.01;

/// Target ratios must sum to 1.0 within this tolerance.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-4;

/// Map a requested valuation currency onto the ticker venues actually quote.
///
/// Only `USD` is substituted (by `USDT`); every other ticker passes through.
pub fn quoted_currency(currency: &str) -> &str {
    if currency.eq_ignore_ascii_case(USD) {
        USD_PROXY
    } else {
        currency
    }
}

/// Case-insensitive ticker comparison.
pub fn same_ticker(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_is_quoted_as_tether() {
        assert_eq!(quoted_currency("USD"), "USDT");
        assert_eq!(quoted_currency("usd"), "USDT");
    }

    #[test]
    fn other_currencies_pass_through() {
        assert_eq!(quoted_currency("EUR"), "EUR");
        assert_eq!(quoted_currency("USDT"), "USDT");
        assert_eq!(quoted_currency("BTC"), "BTC");
    }

    #[test]
    fn ticker_comparison_ignores_case() {
        assert!(same_ticker("eth", "ETH"));
        assert!(!same_ticker("ETH", "ETC"));
    }
}
