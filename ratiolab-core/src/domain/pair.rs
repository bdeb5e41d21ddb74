//! Typed trading-pair key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(base, quote)` trading pair, e.g. `ETH/BTC`.
///
/// Both legs are upper-cased on construction so lookups are case-insensitive
/// without ever having to split a concatenated symbol like `ETHBTC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub base: String,
    pub quote: String,
}

impl PairKey {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_ascii_uppercase(),
            quote: quote.trim().to_ascii_uppercase(),
        }
    }

    /// Exchange-style concatenated symbol (`ETHBTC`).
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Pair of an asset with itself (`BTC/BTC`).
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_are_normalized() {
        let pair = PairKey::new("eth", " btc");
        assert_eq!(pair, PairKey::new("ETH", "BTC"));
        assert_eq!(pair.symbol(), "ETHBTC");
        assert_eq!(pair.to_string(), "ETH/BTC");
    }

    #[test]
    fn ambiguous_concatenations_stay_distinct() {
        // "AB"+"CD" and "A"+"BCD" concatenate identically but are different pairs.
        let a = PairKey::new("AB", "CD");
        let b = PairKey::new("A", "BCD");
        assert_eq!(a.symbol(), b.symbol());
        assert_ne!(a, b);
    }

    #[test]
    fn identity_pair() {
        assert!(PairKey::new("BTC", "btc").is_identity());
        assert!(!PairKey::new("ETH", "BTC").is_identity());
    }
}
