//! Historical simulator: replay a ratio set over stored prices at a fixed
//! rebalancing cadence.
//!
//! One run walks `[start, end)` in steps of `cadence_days`. At each step the
//! portfolio is valued in BTC from the first quote at-or-after the step date
//! and every managed holding is moved to its target weight. Locked balances are
//! folded into `free` after the first step.
//!
//! Data gaps never abort a run, and never lose value:
//! - a step where some managed asset has no quote is skipped entirely, so
//!   nothing is sold into an asset that cannot be bought or valued
//! - a step where the managed portfolio is worth nothing is skipped entirely
//! - holdings not named in the ratio set are carried unchanged
//! - a target asset missing from the wallet starts at zero and is bought

use std::collections::HashMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::HistoricalPriceStore;
use crate::domain::{
    find_asset, find_ratio, quoted_currency, same_ticker, validate_ratios, ConfigError, HoldingRatio,
    OwnedAsset, PairKey, PriceQuote, BTC,
};
use crate::price_index::PriceIndex;
use crate::rebalance::{adjustment, total_value};

/// Cadences tried by a default sweep.
pub const DEFAULT_CADENCES: RangeInclusive<u32> = 1..=30;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid simulation input: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of one simulation run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ratios: Vec<HoldingRatio>,
    pub cadence_days: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_assets: Vec<OwnedAsset>,
    pub final_assets: Vec<OwnedAsset>,
    pub initial_value_btc: f64,
    pub final_value_btc: f64,
    pub report_currency: String,
    /// Final value converted with the closing `BTC -> report currency` quote;
    /// 0.0 when that quote is missing.
    pub final_value_report: f64,
    /// Steps that actually rebalanced (skipped steps are not counted).
    pub steps: u32,
}

impl AnalysisResult {
    pub fn profit_btc(&self) -> f64 {
        self.final_value_btc - self.initial_value_btc
    }
}

/// Prefetched price series for a fixed set of tickers, all quoted in BTC.
///
/// Loading happens once per date range so a cadence sweep or a multi-trial
/// search never goes back to the store.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    series: HashMap<String, Vec<PriceQuote>>,
    conversion: Vec<PriceQuote>,
    report_currency: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl PriceHistory {
    /// Query `ticker/BTC` for every ticker plus `BTC/<report currency>`.
    ///
    /// BTC itself is never queried. A failed query is logged and treated as
    /// an empty series.
    pub fn load<I, S>(
        store: &dyn HistoricalPriceStore,
        tickers: I,
        report_currency: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, SimulationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if start >= end {
            return Err(ConfigError::InvalidRange.into());
        }

        let fetch = |pair: PairKey| -> Vec<PriceQuote> {
            match store.query_prices(&pair, start, end) {
                Ok(quotes) => {
                    if quotes.is_empty() {
                        warn!(%pair, store = store.name(), "no price history in range");
                    }
                    quotes.into_iter().filter(PriceQuote::is_usable).collect()
                }
                Err(e) => {
                    warn!(%pair, store = store.name(), error = %e, "price query failed");
                    Vec::new()
                }
            }
        };

        let mut series = HashMap::new();
        for ticker in tickers {
            let ticker = ticker.as_ref().trim().to_ascii_uppercase();
            if same_ticker(&ticker, BTC) || series.contains_key(&ticker) {
                continue;
            }
            let quotes = fetch(PairKey::new(&ticker, BTC));
            series.insert(ticker, quotes);
        }

        let target = quoted_currency(report_currency);
        let conversion = if same_ticker(target, BTC) {
            Vec::new()
        } else {
            fetch(PairKey::new(BTC, target))
        };

        Ok(Self {
            series,
            conversion,
            report_currency: report_currency.to_ascii_uppercase(),
            start,
            end,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn report_currency(&self) -> &str {
        &self.report_currency
    }

    /// Tickers that were queried (BTC excluded).
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Prices in effect at `at`: the first quote at-or-after `at` per series.
    pub fn snapshot_at(&self, at: DateTime<Utc>) -> PriceIndex {
        let first_after = |quotes: &[PriceQuote]| {
            let idx = quotes.partition_point(|q| q.observed_at < at);
            quotes.get(idx).cloned()
        };
        self.series
            .values()
            .map(Vec::as_slice)
            .chain(std::iter::once(self.conversion.as_slice()))
            .filter_map(first_after)
            .collect()
    }

    /// Last known prices of the range, used to value the terminal portfolio.
    pub fn closing_snapshot(&self) -> PriceIndex {
        self.series
            .values()
            .chain(std::iter::once(&self.conversion))
            .filter_map(|quotes| quotes.last().cloned())
            .collect()
    }
}

/// Replays ratio sets over one prefetched [`PriceHistory`].
#[derive(Debug, Clone)]
pub struct HistoricalSimulator {
    history: PriceHistory,
    parallel: bool,
}

impl HistoricalSimulator {
    pub fn new(history: PriceHistory) -> Self {
        Self {
            history,
            parallel: true,
        }
    }

    /// Enables or disables parallel cadence sweeps.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Run one simulation at `cadence_days`.
    pub fn run(
        &self,
        ratios: &[HoldingRatio],
        initial: &[OwnedAsset],
        cadence_days: u32,
    ) -> Result<AnalysisResult, SimulationError> {
        check_inputs(ratios, initial)?;
        if cadence_days == 0 {
            return Err(ConfigError::InvalidCadence(cadence_days).into());
        }
        Ok(self.simulate(ratios, initial, cadence_days))
    }

    /// Run the same ratio set once per cadence, in cadence order.
    pub fn run_cadence_sweep(
        &self,
        ratios: &[HoldingRatio],
        initial: &[OwnedAsset],
        cadences: RangeInclusive<u32>,
    ) -> Result<Vec<AnalysisResult>, SimulationError> {
        check_inputs(ratios, initial)?;
        if *cadences.start() == 0 {
            return Err(ConfigError::InvalidCadence(0).into());
        }
        if cadences.is_empty() {
            return Err(ConfigError::InvalidCadence(*cadences.end()).into());
        }

        let results: Vec<AnalysisResult> = if self.parallel {
            cadences
                .into_par_iter()
                .map(|cadence| self.simulate(ratios, initial, cadence))
                .collect()
        } else {
            cadences
                .map(|cadence| self.simulate(ratios, initial, cadence))
                .collect()
        };
        Ok(results)
    }

    fn simulate(
        &self,
        ratios: &[HoldingRatio],
        initial: &[OwnedAsset],
        cadence_days: u32,
    ) -> AnalysisResult {
        let history = &self.history;
        let opening = history.snapshot_at(history.start);
        let initial_value_btc = total_value(initial, ratios, &opening, BTC);

        let mut assets = with_targets(initial, ratios);
        let mut current = history.start;
        let mut steps = 0u32;

        while current < history.end {
            let prices = history.snapshot_at(current);
            let total = total_value(&assets, ratios, &prices, BTC);
            debug!(date = %current, total_btc = total, cadence_days, "simulation step");

            if let Some(ticker) = first_unpriced(&assets, ratios, &prices) {
                warn!(date = %current, %ticker, "managed asset has no price at step, skipping");
            } else if total.is_finite() && total > 0.0 {
                assets = rebalance_step(&assets, ratios, &prices, total);
                steps += 1;
            } else {
                warn!(date = %current, "portfolio has no value at step, skipping");
            }
            current += Duration::days(i64::from(cadence_days));
        }

        let closing = history.closing_snapshot();
        let final_value_btc = total_value(&assets, ratios, &closing, BTC);
        let final_value_report = if same_ticker(&history.report_currency, BTC) {
            final_value_btc
        } else {
            total_value(&assets, ratios, &closing, &history.report_currency)
        };

        info!(
            cadence_days,
            steps,
            initial_btc = initial_value_btc,
            final_btc = final_value_btc,
            "simulation complete"
        );

        AnalysisResult {
            ratios: ratios.to_vec(),
            cadence_days,
            start: history.start,
            end: history.end,
            initial_assets: initial.to_vec(),
            final_assets: assets,
            initial_value_btc,
            final_value_btc,
            report_currency: history.report_currency.clone(),
            final_value_report,
            steps,
        }
    }
}

fn check_inputs(ratios: &[HoldingRatio], initial: &[OwnedAsset]) -> Result<(), ConfigError> {
    validate_ratios(ratios)?;
    if initial.is_empty() {
        return Err(ConfigError::NoHoldings);
    }
    Ok(())
}

/// Working wallet: the initial holdings plus a zero entry for every target
/// asset not held yet.
fn with_targets(initial: &[OwnedAsset], ratios: &[HoldingRatio]) -> Vec<OwnedAsset> {
    let mut assets = initial.to_vec();
    for ratio in ratios {
        if ratio.percent > 0.0 && find_asset(&assets, &ratio.ticker).is_none() {
            assets.push(OwnedAsset::new(ratio.ticker.clone(), 0.0, 0.0));
        }
    }
    assets
}

/// First managed asset that matters at this step (held, or with a non-zero
/// target) but has no BTC price.
fn first_unpriced(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
) -> Option<String> {
    assets
        .iter()
        .filter(|asset| {
            find_ratio(ratios, &asset.ticker)
                .is_some_and(|ratio| ratio.percent > 0.0 || asset.quantity() > 0.0)
        })
        .find(|asset| prices.price(&asset.ticker, BTC).is_none())
        .map(|asset| asset.ticker.clone())
}

/// New holdings after moving every managed asset to its target.
///
/// Callers guarantee every managed asset is priced, so the BTC value of the
/// managed book is the same before and after.
fn rebalance_step(
    assets: &[OwnedAsset],
    ratios: &[HoldingRatio],
    prices: &PriceIndex,
    total: f64,
) -> Vec<OwnedAsset> {
    assets
        .iter()
        .map(|asset| {
            let delta = find_ratio(ratios, &asset.ticker).and_then(|ratio| {
                let price = prices.price(&asset.ticker, BTC)?;
                adjustment(asset, ratio.percent, price, total)
            });
            match delta {
                Some(delta) => asset.adjusted(delta),
                None => asset.clone(),
            }
        })
        .collect()
}

/// Load the price history for `ratios` and run a single simulation.
pub fn run_simulation(
    store: &dyn HistoricalPriceStore,
    ratios: &[HoldingRatio],
    initial: &[OwnedAsset],
    cadence_days: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    report_currency: &str,
) -> Result<AnalysisResult, SimulationError> {
    let tickers = ratios.iter().map(|r| r.ticker.as_str());
    let history = PriceHistory::load(store, tickers, report_currency, start, end)?;
    HistoricalSimulator::new(history).run(ratios, initial, cadence_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryPriceStore;
    use crate::domain::parse_timestamp;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn flat_store() -> InMemoryPriceStore {
        let mut store = InMemoryPriceStore::new();
        for day in 1..=10 {
            let date = at(&format!("2018-03-{day:02}"));
            store.insert(PriceQuote::new("ETH", "BTC", 0.05, date));
            store.insert(PriceQuote::new("BTC", "USDT", 10_000.0, date));
        }
        store
    }

    fn half_half() -> Vec<HoldingRatio> {
        vec![
            HoldingRatio::new("BTC", 0.5, true),
            HoldingRatio::new("ETH", 0.5, true),
        ]
    }

    fn wallet() -> Vec<OwnedAsset> {
        vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 0.0, 0.0)]
    }

    fn simulator(store: &InMemoryPriceStore) -> HistoricalSimulator {
        let history =
            PriceHistory::load(store, ["BTC", "ETH"], "USD", at("2018-03-01"), at("2018-03-11"))
                .unwrap();
        HistoricalSimulator::new(history)
    }

    #[test]
    fn flat_prices_rebalance_once_and_hold() {
        let store = flat_store();
        let result = simulator(&store).run(&half_half(), &wallet(), 1).unwrap();

        assert_eq!(result.steps, 10);
        let btc = &result.final_assets[0];
        let eth = &result.final_assets[1];
        assert!((btc.quantity() - 0.5).abs() < 1e-9);
        assert!((eth.quantity() - 10.0).abs() < 1e-9);
        assert!((result.initial_value_btc - 1.0).abs() < 1e-9);
        assert!((result.final_value_btc - 1.0).abs() < 1e-9);
        assert!((result.final_value_report - 10_000.0).abs() < 1e-6);
        assert!(result.profit_btc().abs() < 1e-9);
        assert_eq!(result.report_currency, "USD");
    }

    #[test]
    fn cadence_controls_step_count() {
        let store = flat_store();
        let sim = simulator(&store);
        assert_eq!(sim.run(&half_half(), &wallet(), 3).unwrap().steps, 4);
        assert_eq!(sim.run(&half_half(), &wallet(), 10).unwrap().steps, 1);
        assert_eq!(sim.run(&half_half(), &wallet(), 30).unwrap().steps, 1);
    }

    #[test]
    fn rebalancing_captures_mean_reversion() {
        // ETH doubles then returns; a rebalanced portfolio ends ahead.
        let mut store = InMemoryPriceStore::new();
        let prices = [0.05, 0.10, 0.05];
        for (i, price) in prices.iter().enumerate() {
            let date = at(&format!("2018-03-{:02}", i + 1));
            store.insert(PriceQuote::new("ETH", "BTC", *price, date));
        }
        let history =
            PriceHistory::load(&store, ["ETH"], "BTC", at("2018-03-01"), at("2018-03-04")).unwrap();
        let result = HistoricalSimulator::new(history)
            .run(&half_half(), &wallet(), 1)
            .unwrap();

        assert_eq!(result.steps, 3);
        assert!(result.final_value_btc > result.initial_value_btc);
        assert_eq!(result.final_value_report, result.final_value_btc);
    }

    #[test]
    fn unmanaged_holdings_are_carried() {
        let store = flat_store();
        let mut assets = wallet();
        assets.push(OwnedAsset::new("ONT", 42.0, 1.0));
        let result = simulator(&store).run(&half_half(), &assets, 2).unwrap();
        let ont = result.final_assets.iter().find(|a| a.is("ONT")).unwrap();
        assert_eq!(ont.quantity(), 43.0);
    }

    #[test]
    fn missing_history_keeps_quantities() {
        let store = InMemoryPriceStore::new();
        let history =
            PriceHistory::load(&store, ["ETH"], "USD", at("2018-03-01"), at("2018-03-05")).unwrap();
        let assets = vec![OwnedAsset::new("BTC", 1.0, 0.0), OwnedAsset::new("ETH", 5.0, 0.0)];
        let result = HistoricalSimulator::new(history)
            .run(&half_half(), &assets, 1)
            .unwrap();

        // ETH is never priced, so no step may trade BTC into it.
        assert_eq!(result.steps, 0);
        assert_eq!(result.final_assets[0].quantity(), 1.0);
        assert_eq!(result.final_assets[1].quantity(), 5.0);
        assert_eq!(result.final_value_report, 0.0);
    }

    #[test]
    fn series_ending_early_conserves_value() {
        // ETH is quoted on days 1-5 only; days 6-10 are a tail gap.
        let mut store = InMemoryPriceStore::new();
        for day in 1..=5 {
            let date = at(&format!("2018-03-{day:02}"));
            store.insert(PriceQuote::new("ETH", "BTC", 0.05, date));
        }
        let history =
            PriceHistory::load(&store, ["ETH"], "BTC", at("2018-03-01"), at("2018-03-11")).unwrap();
        let assets = vec![OwnedAsset::new("BTC", 0.5, 0.0), OwnedAsset::new("ETH", 10.0, 0.0)];
        let result = HistoricalSimulator::new(history)
            .run(&half_half(), &assets, 1)
            .unwrap();

        assert_eq!(result.steps, 5);
        assert!((result.final_assets[0].quantity() - 0.5).abs() < 1e-12);
        assert!((result.final_assets[1].quantity() - 10.0).abs() < 1e-12);
        assert!((result.final_value_btc - result.initial_value_btc).abs() < 1e-12);
    }

    #[test]
    fn gap_in_the_middle_conserves_value() {
        // ETH skips days 3-4 and comes back flat.
        let mut store = InMemoryPriceStore::new();
        for day in [1, 2, 5, 6] {
            let date = at(&format!("2018-03-{day:02}"));
            store.insert(PriceQuote::new("ETH", "BTC", 0.05, date));
        }
        let history =
            PriceHistory::load(&store, ["ETH"], "BTC", at("2018-03-01"), at("2018-03-07")).unwrap();
        let result = HistoricalSimulator::new(history)
            .run(&half_half(), &wallet(), 1)
            .unwrap();

        assert!((result.final_value_btc - 1.0).abs() < 1e-12);
        assert!((result.final_assets[0].quantity() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unheld_target_asset_is_bought() {
        let store = flat_store();
        let result = simulator(&store)
            .run(&half_half(), &[OwnedAsset::new("BTC", 1.0, 0.0)], 1)
            .unwrap();

        let eth = result.final_assets.iter().find(|a| a.is("ETH")).unwrap();
        assert!((eth.quantity() - 10.0).abs() < 1e-9);
        assert!((result.final_value_btc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn worthless_portfolio_skips_every_step() {
        let store = flat_store();
        let assets = vec![OwnedAsset::new("BTC", 0.0, 0.0), OwnedAsset::new("ETH", 0.0, 0.0)];
        let result = simulator(&store).run(&half_half(), &assets, 1).unwrap();
        assert_eq!(result.steps, 0);
        assert_eq!(result.final_assets, assets);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let store = flat_store();
        let sim = simulator(&store);
        assert!(matches!(
            sim.run(&half_half(), &wallet(), 0),
            Err(SimulationError::Config(ConfigError::InvalidCadence(0)))
        ));
        assert!(matches!(
            sim.run(&[], &wallet(), 1),
            Err(SimulationError::Config(ConfigError::EmptyRatios))
        ));
        assert!(matches!(
            sim.run(&half_half(), &[], 1),
            Err(SimulationError::Config(ConfigError::NoHoldings))
        ));
        assert!(matches!(
            PriceHistory::load(&store, ["ETH"], "USD", at("2018-03-05"), at("2018-03-01")),
            Err(SimulationError::Config(ConfigError::InvalidRange))
        ));
    }

    #[test]
    fn sweep_returns_one_result_per_cadence_in_order() {
        let store = flat_store();
        let sim = simulator(&store);
        let parallel = sim.run_cadence_sweep(&half_half(), &wallet(), DEFAULT_CADENCES).unwrap();
        let sequential = sim
            .clone()
            .with_parallelism(false)
            .run_cadence_sweep(&half_half(), &wallet(), DEFAULT_CADENCES)
            .unwrap();

        assert_eq!(parallel.len(), 30);
        let cadences: Vec<u32> = parallel.iter().map(|r| r.cadence_days).collect();
        assert_eq!(cadences, (1..=30).collect::<Vec<_>>());
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn sweep_rejects_zero_cadence() {
        let store = flat_store();
        assert!(simulator(&store)
            .run_cadence_sweep(&half_half(), &wallet(), 0..=5)
            .is_err());
    }

    #[test]
    fn snapshot_uses_first_quote_at_or_after() {
        let store = flat_store();
        let history = simulator(&store).history().clone();
        let snap = history.snapshot_at(at("2018-03-04T06:00:00Z"));
        let quote = snap.quote("ETH", "BTC").unwrap();
        assert_eq!(quote.observed_at, at("2018-03-05"));
        assert_eq!(snap.price("BTC", "BTC"), Some(1.0));
        assert_eq!(snap.price("BTC", "USDT"), Some(10_000.0));
    }

    #[test]
    fn run_simulation_loads_and_runs() {
        let store = flat_store();
        let result = run_simulation(
            &store,
            &half_half(),
            &wallet(),
            5,
            at("2018-03-01"),
            at("2018-03-11"),
            "USD",
        )
        .unwrap();
        assert_eq!(result.cadence_days, 5);
        assert_eq!(result.steps, 2);
    }
}
