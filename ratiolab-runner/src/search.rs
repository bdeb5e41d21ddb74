//! Ratio search: propose ratio vectors, sweep each across cadences, keep the best.
//!
//! The loop is strategy-agnostic. A [`SearchStrategy`] proposes the next ratio
//! vector from the results seen so far; [`RandomSearch`] ignores them and draws
//! a fresh random vector every time.
//!
//! Proposals are requested in batches of `batch_size`. A batch is evaluated
//! (in parallel when enabled) and its results are fed back before the next
//! batch is proposed.

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use ratiolab_core::data::HistoricalPriceStore;
use ratiolab_core::domain::{HoldingRatio, OwnedAsset};
use ratiolab_core::rng::RngHierarchy;
use ratiolab_core::{AnalysisResult, HistoricalSimulator, PriceHistory, RatioSampler, ReportWriter};

use crate::config::SearchConfig;
use crate::history::ResultHistory;
use crate::leaderboard::{compare_results, Leaderboard};

/// Proposes ratio vectors to evaluate.
pub trait SearchStrategy: Send {
    fn name(&self) -> &str;

    /// Next ratio vector to try, given every result evaluated so far.
    fn propose(
        &mut self,
        assets: &[OwnedAsset],
        existing: &[HoldingRatio],
        history: &[AnalysisResult],
    ) -> Vec<HoldingRatio>;
}

/// Uniform random ratio vectors, one deterministic RNG stream per trial.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: RngHierarchy,
    trial: u64,
}

impl RandomSearch {
    const LABEL: &'static str = "random-search";

    pub fn new(rng: RngHierarchy) -> Self {
        Self { rng, trial: 0 }
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &str {
        Self::LABEL
    }

    fn propose(
        &mut self,
        assets: &[OwnedAsset],
        existing: &[HoldingRatio],
        _history: &[AnalysisResult],
    ) -> Vec<HoldingRatio> {
        let rng = self.rng.rng_for(Self::LABEL, self.trial);
        self.trial += 1;
        RatioSampler::new(rng).sample(assets, existing)
    }
}

/// Everything a search produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Every result, in trial order then cadence order.
    pub results: Vec<AnalysisResult>,
    /// Highest final BTC value across all results, ranked like the
    /// leaderboard: ties go to the lower cadence, then the earlier trial.
    pub best: Option<AnalysisResult>,
    pub leaderboard: Leaderboard,
    pub trials: usize,
}

/// Run `config.trials` proposals from `strategy` over the configured window.
///
/// Prices for every held asset are loaded once. Each proposal is swept across
/// `config.cadences()`; results stream to the report and history files as
/// soon as their batch completes.
pub fn run_search(
    config: &SearchConfig,
    store: &dyn HistoricalPriceStore,
    assets: &[OwnedAsset],
    existing: &[HoldingRatio],
    strategy: &mut dyn SearchStrategy,
) -> Result<SearchOutcome> {
    config.validate().context("invalid search config")?;
    anyhow::ensure!(!assets.is_empty(), "no holdings to search over");

    let tickers = assets.iter().map(|a| a.ticker.as_str());
    let history = PriceHistory::load(store, tickers, &config.report_currency, config.start, config.end)
        .context("load price history")?;
    let simulator = HistoricalSimulator::new(history).with_parallelism(config.parallel);

    let mut report = match &config.report_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("create report file {}", path.display()))?;
            Some(ReportWriter::new(BufWriter::new(file)))
        }
        None => None,
    };
    let result_history = config.history_path.as_ref().map(ResultHistory::new);

    info!(
        strategy = strategy.name(),
        store = store.name(),
        trials = config.trials,
        cadences = ?config.cadences(),
        "starting ratio search"
    );

    let mut results: Vec<AnalysisResult> = Vec::new();
    let mut leaderboard = Leaderboard::new(config.leaderboard_size);
    let batch_size = config.batch_size.max(1);
    let mut trial: u64 = 0;

    while (trial as usize) < config.trials {
        let remaining = config.trials - trial as usize;
        let proposals: Vec<Vec<HoldingRatio>> = (0..remaining.min(batch_size))
            .map(|_| strategy.propose(assets, existing, &results))
            .collect();

        let evaluate = |ratios: &Vec<HoldingRatio>| {
            simulator.run_cadence_sweep(ratios, assets, config.cadences())
        };
        let batch = if config.parallel {
            proposals.par_iter().map(evaluate).collect::<Result<Vec<_>, _>>()
        } else {
            proposals.iter().map(evaluate).collect::<Result<Vec<_>, _>>()
        }
        .with_context(|| format!("evaluate trials starting at {trial}"))?;

        for sweep in batch {
            if let Some(report) = report.as_mut() {
                report
                    .write_batch(&sweep)
                    .context("write search report")?;
            }
            if let Some(history) = &result_history {
                history
                    .append(trial, &sweep)
                    .with_context(|| format!("append to {}", history.path().display()))?;
            }
            let placed = leaderboard.extend_trial(trial, &sweep);
            let trial_best = sweep
                .iter()
                .map(|r| r.final_value_btc)
                .fold(f64::NEG_INFINITY, f64::max);
            info!(trial, best_btc = trial_best, leaderboard_inserts = placed, "trial complete");
            debug!(trial, ratios = ?sweep.first().map(|r| &r.ratios), "trial ratios");

            results.extend(sweep);
            trial += 1;
        }
    }

    let best = best_result(&results).cloned();

    if let Some(best) = &best {
        info!(
            final_btc = best.final_value_btc,
            cadence_days = best.cadence_days,
            "search complete"
        );
    }

    Ok(SearchOutcome {
        results,
        best,
        leaderboard,
        trials: config.trials,
    })
}

/// `results` must be in trial order; `min_by` keeps the first of equal
/// elements, so a tie resolves to the earlier trial.
fn best_result(results: &[AnalysisResult]) -> Option<&AnalysisResult> {
    results
        .iter()
        .filter(|r| r.final_value_btc.is_finite())
        .min_by(|a, b| compare_results(a, b))
}
