//! Rebalance calculator — holdings + target ratios + prices -> buy/sell quantities.
//!
//! Every calculation is denominated in BTC. Two business rules are easy to miss:
//! - Total value only counts assets that appear in the ratio set. Holdings
//!   outside the managed universe never enter the denominator.
//! - Valuation in `USD` goes through the `BTC/USDT` pair ([`quoted_currency`]).
//!
//! Missing prices degrade instead of failing: an unpriced asset is valued at
//! 0.0 and receives no adjustment. Configuration problems (bad ratio sets) are
//! the only hard errors and are raised by [`RebalanceCalculator::new`].

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::domain::{
    find_asset, quoted_currency, same_ticker, validate_ratios, AdjustmentMap, ConfigError,
    HoldingRatio, OwnedAsset, BTC, DUST_THRESHOLD,
};
use crate::price_index::PriceIndex;

/// Direction of a planned trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// One planned market order: trade `quantity` units of `ticker` against BTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub ticker: String,
    pub side: OrderSide,
    /// Always positive; the direction lives in `side`.
    pub quantity: f64,
}

impl TradeIntent {
    /// Build an intent from a signed adjustment (negative = sell).
    pub fn from_delta(ticker: &str, delta: f64) -> Self {
        let side = if delta < 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        Self {
            ticker: ticker.to_string(),
            side,
            quantity: delta.abs(),
        }
    }

    /// Quantity with the sign convention of an [`AdjustmentMap`].
    pub fn signed_quantity(&self) -> f64 {
        match self.side {
            OrderSide::Buy => self.quantity,
            OrderSide::Sell => -self.quantity,
        }
    }
}

/// Signed drift of one asset relative to its own current size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDrift {
    pub ticker: String,
    pub drift: f64,
}

/// Value of a holding in `base`.
///
/// The base currency itself is worth its quantity. Any other asset without a
/// quote is logged and valued at 0.0.
pub fn value_of(asset: &OwnedAsset, prices: &PriceIndex, base: &str) -> f64 {
    if asset.is(base) {
        return asset.quantity();
    }
    match prices.price(&asset.ticker, base) {
        Some(price) => asset.quantity() * price,
        None => {
            error!(ticker = %asset.ticker, base, "can't find price");
            0.0
        }
    }
}

/// Total value of the managed holdings in `base`.
///
/// Only assets named in `ratios` are counted. Non-BTC currencies are reached
/// by valuing in BTC first and converting with the `BTC -> base` quote; when
/// that quote is missing the result is 0.0.
pub fn total_value(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
    base: &str,
) -> f64 {
    if !same_ticker(base, BTC) {
        let total_btc = total_value(assets, ratios, prices, BTC);
        let target = quoted_currency(base);
        return match prices.price(BTC, target) {
            Some(rate) => total_btc * rate,
            None => {
                error!(currency = target, "cannot find mapping from BTC");
                0.0
            }
        };
    }

    ratios
        .iter()
        .filter_map(|ratio| find_asset(assets, &ratio.ticker))
        .map(|asset| value_of(asset, prices, base))
        .sum()
}

/// Units of `asset` to buy (+) or sell (-) so that its value reaches
/// `desired_ratio` of `total_value`.
///
/// `delta = (desired_ratio * total_value - quantity * price) / price`
///
/// Returns `None` when `current_price` is not a positive finite number, or
/// the result would not be finite; callers skip the asset in that case.
pub fn adjustment(
    asset: &OwnedAsset,
    desired_ratio: f64,
    current_price: f64,
    total_value: f64,
) -> Option<f64> {
    if !(current_price.is_finite() && current_price > 0.0) {
        return None;
    }
    let owned_value = asset.quantity() * current_price;
    let desired_value = desired_ratio * total_value;
    let delta = (desired_value - owned_value) / current_price;
    delta.is_finite().then_some(delta)
}

/// Adjustments (in each asset's own units) that bring the managed holdings to
/// their target ratios.
///
/// Ratios without a matching holding or without a BTC price are skipped.
/// Non-fractional assets are rounded to whole units, and anything at or below
/// [`DUST_THRESHOLD`] is left out of the map.
pub fn compute_adjustments(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
) -> AdjustmentMap {
    let total = total_value(assets, ratios, prices, BTC);
    let mut adjustments = AdjustmentMap::new();

    for ratio in ratios {
        let Some(asset) = find_asset(assets, &ratio.ticker) else {
            continue;
        };
        let Some(price) = prices.price(&asset.ticker, BTC) else {
            warn!(ticker = %asset.ticker, "no BTC price, skipping adjustment");
            continue;
        };
        let Some(mut delta) = adjustment(asset, ratio.percent, price, total) else {
            continue;
        };
        if !ratio.fractional {
            delta = delta.round();
        }
        if delta.abs() > DUST_THRESHOLD {
            adjustments.insert(asset.ticker.clone(), delta);
        }
    }
    adjustments
}

/// Drift of one asset: `delta / quantity`.
///
/// An empty position with a pending adjustment is fully off target, so its
/// drift has magnitude 1.0.
pub fn fractional_drift(asset: &OwnedAsset, delta: f64) -> f64 {
    let held = asset.quantity();
    if held > 0.0 {
        delta / held
    } else {
        delta.signum()
    }
}

/// `(ratio, holding, delta)` for every ratio with a non-omitted adjustment.
fn adjusted_holdings<'a>(
    assets: &'a [OwnedAsset],
    ratios: &'a [HoldingRatio],
    adjustments: &AdjustmentMap,
) -> Vec<(&'a HoldingRatio, &'a OwnedAsset, f64)> {
    ratios
        .iter()
        .filter_map(|ratio| {
            let asset = find_asset(assets, &ratio.ticker)?;
            let delta = adjustments.get(&asset.ticker)?;
            Some((ratio, asset, *delta))
        })
        .collect()
}

/// Signed per-asset drift for every asset that needs trading.
pub fn drifts(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
) -> Vec<AssetDrift> {
    let adjustments = compute_adjustments(assets, ratios, prices);
    adjusted_holdings(assets, ratios, &adjustments)
        .into_iter()
        .map(|(_, asset, delta)| AssetDrift {
            ticker: asset.ticker.clone(),
            drift: fractional_drift(asset, delta),
        })
        .collect()
}

/// Aggregate drift: each asset's absolute fractional drift weighted by its
/// target percent, summed. Buys and sells never cancel out.
pub fn drift_percent(assets: &[OwnedAsset], ratios: &[HoldingRatio], prices: &PriceIndex) -> f64 {
    let adjustments = compute_adjustments(assets, ratios, prices);
    adjusted_holdings(assets, ratios, &adjustments)
        .into_iter()
        .map(|(ratio, asset, delta)| fractional_drift(asset, delta).abs() * ratio.percent)
        .sum()
}

/// Whether any single asset's unweighted absolute drift exceeds `threshold`.
pub fn max_single_drift_exceeded(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
    threshold: f64,
) -> bool {
    let adjustments = compute_adjustments(assets, ratios, prices);
    adjusted_holdings(assets, ratios, &adjustments)
        .into_iter()
        .any(|(_, asset, delta)| fractional_drift(asset, delta).abs() > threshold)
}

/// Rebalance when aggregate drift exceeds `min_aggregate_drift` or any single
/// asset exceeds `min_single_drift`. A threshold of 0 disables its check.
pub fn should_rebalance(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
    min_aggregate_drift: f64,
    min_single_drift: f64,
) -> bool {
    if min_aggregate_drift > 0.0 && drift_percent(assets, ratios, prices) > min_aggregate_drift {
        return true;
    }
    min_single_drift > 0.0 && max_single_drift_exceeded(assets, ratios, prices, min_single_drift)
}

/// Order the adjustments as trades: every sell before any buy, so the BTC
/// raised by selling is available when the buys are placed.
pub fn plan_orders(adjustments: &AdjustmentMap) -> Vec<TradeIntent> {
    let (sells, buys): (Vec<_>, Vec<_>) = adjustments
        .iter()
        .filter(|(_, delta)| delta.is_finite() && **delta != 0.0)
        .partition(|(_, delta)| **delta < 0.0);

    sells
        .into_iter()
        .chain(buys)
        .map(|(ticker, delta)| TradeIntent::from_delta(ticker, *delta))
        .collect()
}

/// A validated snapshot of holdings, target ratios and live prices.
///
/// Construction fails on a bad ratio set or an empty wallet; after that every
/// query is infallible.
#[derive(Debug, Clone)]
pub struct RebalanceCalculator {
    assets: Vec<OwnedAsset>,
    ratios: Vec<HoldingRatio>,
    prices: PriceIndex,
}

impl RebalanceCalculator {
    pub fn new(
        assets: Vec<OwnedAsset>,
        ratios: Vec<HoldingRatio>,
        prices: PriceIndex,
    ) -> Result<Self, ConfigError> {
        validate_ratios(&ratios)?;
        if assets.is_empty() {
            return Err(ConfigError::NoHoldings);
        }
        Ok(Self {
            assets,
            ratios,
            prices,
        })
    }

    /// Same holdings and ratios against a fresh price snapshot.
    pub fn with_prices(self, prices: PriceIndex) -> Self {
        Self { prices, ..self }
    }

    pub fn assets(&self) -> &[OwnedAsset] {
        &self.assets
    }

    pub fn ratios(&self) -> &[HoldingRatio] {
        &self.ratios
    }

    pub fn prices(&self) -> &PriceIndex {
        &self.prices
    }

    pub fn total_value(&self, base: &str) -> f64 {
        total_value(&self.assets, &self.ratios, &self.prices, base)
    }

    pub fn adjustments(&self) -> AdjustmentMap {
        compute_adjustments(&self.assets, &self.ratios, &self.prices)
    }

    pub fn drifts(&self) -> Vec<AssetDrift> {
        drifts(&self.assets, &self.ratios, &self.prices)
    }

    pub fn drift_percent(&self) -> f64 {
        drift_percent(&self.assets, &self.ratios, &self.prices)
    }

    pub fn max_single_drift_exceeded(&self, threshold: f64) -> bool {
        max_single_drift_exceeded(&self.assets, &self.ratios, &self.prices, threshold)
    }

    pub fn should_rebalance(&self, min_aggregate_drift: f64, min_single_drift: f64) -> bool {
        should_rebalance(
            &self.assets,
            &self.ratios,
            &self.prices,
            min_aggregate_drift,
            min_single_drift,
        )
    }

    pub fn plan_orders(&self) -> Vec<TradeIntent> {
        plan_orders(&self.adjustments())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{parse_timestamp, PriceQuote};

    fn prices(pairs: &[(&str, &str, f64)]) -> PriceIndex {
        let at = parse_timestamp("2018-05-19").unwrap();
        pairs
            .iter()
            .map(|(base, quote, price)| PriceQuote::new(base, quote, *price, at))
            .collect()
    }

    fn ratio(ticker: &str, percent: f64) -> HoldingRatio {
        HoldingRatio::new(ticker, percent, true)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn half_btc_half_eth_from_all_btc() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 0.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        assert_close(total_value(&assets, &ratios, &index, BTC), 1.0);

        let adjustments = compute_adjustments(&assets, &ratios, &index);
        assert_eq!(adjustments.len(), 2);
        assert_close(adjustments["BTC"], -0.5);
        assert_close(adjustments["ETH"], 10.0);
    }

    #[test]
    fn adjustment_kernel() {
        let asset = OwnedAsset::new("NEO", 100.0, 0.0);
        // 100 NEO at 0.01 BTC = 1 BTC, target 25% of 2 BTC = 0.5 BTC -> sell 50
        assert_close(adjustment(&asset, 0.25, 0.01, 2.0).unwrap(), -50.0);
    }

    #[test]
    fn adjustment_refuses_bad_prices() {
        let asset = OwnedAsset::new("NEO", 100.0, 0.0);
        assert_eq!(adjustment(&asset, 0.25, 0.0, 2.0), None);
        assert_eq!(adjustment(&asset, 0.25, -1.0, 2.0), None);
        assert_eq!(adjustment(&asset, 0.25, f64::NAN, 2.0), None);
    }

    #[test]
    fn locked_quantity_counts_toward_holdings() {
        let asset = OwnedAsset::new("NEO", 60.0, 40.0);
        assert_close(adjustment(&asset, 0.5, 0.01, 2.0).unwrap(), 0.0);
    }

    #[test]
    fn unmanaged_assets_are_excluded_from_total() {
        let assets = vec![
            OwnedAsset::new("BTC", 1.0, 0.0),
            OwnedAsset::new("ETH", 10.0, 0.0),
            OwnedAsset::new("ONT", 1000.0, 0.0),
        ];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05), ("ONT", "BTC", 0.01)]);

        // ONT would add 10 BTC if it were counted
        assert_close(total_value(&assets, &ratios, &index, BTC), 1.5);
        assert!(!compute_adjustments(&assets, &ratios, &index).contains_key("ONT"));
    }

    #[test]
    fn usd_total_uses_tether_pair() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 10.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05), ("BTC", "USDT", 8000.0)]);

        assert_close(total_value(&assets, &ratios, &index, "USD"), 12_000.0);
        assert_close(total_value(&assets, &ratios, &index, "USDT"), 12_000.0);
    }

    #[test]
    fn usd_total_without_conversion_is_zero() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0)];
        let ratios = vec![ratio("BTC", 1.0)];
        let index = prices(&[]);

        assert_eq!(total_value(&assets, &ratios, &index, "USD"), 0.0);
    }

    #[test]
    fn unpriced_asset_is_valued_at_zero_and_skipped() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("NEO", 50.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("NEO", 0.5)];
        let index = prices(&[]);

        assert_close(value_of(&assets[1], &index, BTC), 0.0);
        assert_close(total_value(&assets, &ratios, &index, BTC), 1.0);

        let adjustments = compute_adjustments(&assets, &ratios, &index);
        assert!(!adjustments.contains_key("NEO"));
        assert_close(adjustments["BTC"], -0.5);
    }

    #[test]
    fn ratio_without_holding_is_skipped() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        let adjustments = compute_adjustments(&assets, &ratios, &index);
        assert_eq!(adjustments.len(), 1);
        assert_close(adjustments["BTC"], -0.5);
    }

    #[test]
    fn non_fractional_adjustments_are_rounded() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("NEO", 0.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), HoldingRatio::new("NEO", 0.5, false)];
        // 0.5 BTC / 0.003 = 166.67 NEO
        let index = prices(&[("NEO", "BTC", 0.003)]);

        let adjustments = compute_adjustments(&assets, &ratios, &index);
        assert_eq!(adjustments["NEO"], 167.0);
    }

    #[test]
    fn dust_is_filtered() {
        let assets = vec![OwnedAsset::new("BTC", 0.505, 0.0), OwnedAsset::new("ETH", 9.9, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        // total = 1.0; BTC off by 0.005, ETH off by 0.1 units
        let adjustments = compute_adjustments(&assets, &ratios, &index);
        assert!(!adjustments.contains_key("BTC"));
        assert_close(adjustments["ETH"], 0.1);
    }

    #[test]
    fn rounding_to_zero_is_dropped() {
        // NEO is 0.067 units under target: kept when fractional, rounded away otherwise
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("NEO", 333.2, 0.0)];
        let index = prices(&[("NEO", "BTC", 0.003)]);

        let fractional = vec![ratio("BTC", 0.5), ratio("NEO", 0.5)];
        assert!(compute_adjustments(&assets, &fractional, &index).contains_key("NEO"));

        let whole = vec![ratio("BTC", 0.5), HoldingRatio::new("NEO", 0.5, false)];
        assert!(!compute_adjustments(&assets, &whole, &index).contains_key("NEO"));
    }

    #[test]
    fn drift_is_weighted_by_target() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 10.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        // total 1.5: BTC -0.25 (25% of 1.0), ETH +5 (50% of 10)
        let drifts = drifts(&assets, &ratios, &index);
        assert_eq!(drifts.len(), 2);
        assert_close(drifts[0].drift, -0.25);
        assert_close(drifts[1].drift, 0.5);

        assert_close(drift_percent(&assets, &ratios, &index), 0.375);
    }

    #[test]
    fn max_single_drift_threshold() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 10.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        assert!(max_single_drift_exceeded(&assets, &ratios, &index, 0.2));
        assert!(max_single_drift_exceeded(&assets, &ratios, &index, 0.4));
        assert!(!max_single_drift_exceeded(&assets, &ratios, &index, 0.6));
    }

    #[test]
    fn empty_position_has_full_drift() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 0.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        let drifts = drifts(&assets, &ratios, &index);
        assert_close(drifts[1].drift, 1.0);
        // 0.5 * 0.5 + 1.0 * 0.5
        assert_close(drift_percent(&assets, &ratios, &index), 0.75);
        assert!(drift_percent(&assets, &ratios, &index).is_finite());
    }

    #[test]
    fn zero_thresholds_disable_checks() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 10.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let index = prices(&[("ETH", "BTC", 0.05)]);

        assert!(!should_rebalance(&assets, &ratios, &index, 0.0, 0.0));
        assert!(should_rebalance(&assets, &ratios, &index, 0.3, 0.0));
        assert!(!should_rebalance(&assets, &ratios, &index, 0.4, 0.0));
        assert!(should_rebalance(&assets, &ratios, &index, 0.0, 0.4));
        assert!(!should_rebalance(&assets, &ratios, &index, 0.4, 0.6));
    }

    #[test]
    fn sells_are_planned_before_buys() {
        let mut adjustments = AdjustmentMap::new();
        adjustments.insert("ADA".into(), 120.0);
        adjustments.insert("BTC".into(), -0.5);
        adjustments.insert("ETH".into(), 10.0);
        adjustments.insert("NEO".into(), -3.0);

        let plan = plan_orders(&adjustments);
        let sides: Vec<_> = plan.iter().map(|t| t.side).collect();
        assert_eq!(
            sides,
            vec![OrderSide::Sell, OrderSide::Sell, OrderSide::Buy, OrderSide::Buy]
        );
        assert_eq!(plan[0].ticker, "BTC");
        assert_eq!(plan[0].quantity, 0.5);
        assert_eq!(plan[0].signed_quantity(), -0.5);
        assert_eq!(plan[3].ticker, "ETH");
    }

    #[test]
    fn calculator_rejects_bad_configuration() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0)];
        let err = RebalanceCalculator::new(assets.clone(), vec![ratio("BTC", 0.7)], PriceIndex::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::RatioSum { .. }));

        let err = RebalanceCalculator::new(assets, vec![], PriceIndex::new()).unwrap_err();
        assert_eq!(err, ConfigError::EmptyRatios);

        let err = RebalanceCalculator::new(vec![], vec![ratio("BTC", 1.0)], PriceIndex::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::NoHoldings);
    }

    #[test]
    fn calculator_delegates_to_free_functions() {
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 0.0, 0.0)];
        let ratios = vec![ratio("BTC", 0.5), ratio("ETH", 0.5)];
        let calc =
            RebalanceCalculator::new(assets, ratios, prices(&[("ETH", "BTC", 0.05)])).unwrap();

        assert_close(calc.total_value(BTC), 1.0);
        assert_eq!(calc.adjustments().len(), 2);
        assert_eq!(calc.plan_orders()[0].side, OrderSide::Sell);
        assert!(calc.should_rebalance(0.0, 0.2));

        let calc = calc.with_prices(prices(&[("ETH", "BTC", 0.1)]));
        assert_close(calc.adjustments()["ETH"], 5.0);
    }
}
