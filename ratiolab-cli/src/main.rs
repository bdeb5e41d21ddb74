//! RatioLab CLI — rebalance, simulate, search and ratio configuration commands.
//!
//! Commands:
//! - `rebalance` — compute adjustments for a portfolio snapshot, optionally paper-trade them
//! - `simulate` — replay the configured ratios over a CSV price history
//! - `search` — random ratio search over a CSV price history
//! - `ratios show` / `ratios set` — inspect or replace the target ratios

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ratiolab_core::data::CsvPriceStore;
use ratiolab_core::domain::{correct_ratios, parse_timestamp, validate_ratios, HoldingRatio, BTC};
use ratiolab_core::simulator::DEFAULT_CADENCES;
use ratiolab_core::venue::{execute_plan, ExchangeProvider, PaperSubmitter, RatioStore};
use ratiolab_core::{
    run_simulation, AnalysisResult, HistoricalSimulator, PriceHistory, PriceIndex,
    RebalanceCalculator, ReportWriter,
};
use ratiolab_runner::{run_search, PortfolioFile, RandomSearch, SearchConfig};

#[derive(Parser)]
#[command(
    name = "ratiolab",
    about = "RatioLab CLI — target-ratio portfolio rebalancing and historical ratio search"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the trades that bring a portfolio back to its target ratios.
    Rebalance {
        /// Portfolio snapshot (TOML).
        #[arg(long, default_value = "portfolio.toml")]
        portfolio: PathBuf,

        /// Only rebalance when weighted aggregate drift exceeds this (0 disables).
        #[arg(long, default_value_t = 0.0)]
        min_drift: f64,

        /// Only rebalance when some asset drifts more than this (0 disables).
        #[arg(long, default_value_t = 0.0)]
        min_single_drift: f64,

        /// Submit the plan to the paper venue.
        #[arg(long, default_value_t = false)]
        execute: bool,

        /// Print the plan as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Replay the configured ratios over historical prices.
    Simulate {
        /// Portfolio snapshot (TOML) providing holdings and ratios.
        #[arg(long, default_value = "portfolio.toml")]
        portfolio: PathBuf,

        /// Price history CSV (base,quote,price,observed_at).
        #[arg(long)]
        prices: PathBuf,

        /// Window start (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// Window end, exclusive.
        #[arg(long)]
        end: String,

        /// Single cadence in days. Without it every cadence from 1 to 30 is run.
        #[arg(long)]
        cadence: Option<u32>,

        /// Currency for the final value line.
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Write the report here instead of stdout.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Run the cadence sweep on one thread.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Random ratio search over historical prices.
    Search {
        /// Search configuration (TOML).
        #[arg(long, default_value = "search.toml")]
        config: PathBuf,

        /// Portfolio snapshot (TOML) providing holdings and known ratios.
        #[arg(long, default_value = "portfolio.toml")]
        portfolio: PathBuf,

        /// Price history CSV (base,quote,price,observed_at).
        #[arg(long)]
        prices: PathBuf,

        /// Store the best ratio vector in the portfolio file.
        #[arg(long, default_value_t = false)]
        save_best: bool,
    },
    /// Target ratio configuration.
    Ratios {
        #[command(subcommand)]
        action: RatiosAction,
    },
}

#[derive(Subcommand)]
enum RatiosAction {
    /// Print the configured ratios.
    Show {
        #[arg(long, default_value = "portfolio.toml")]
        portfolio: PathBuf,
    },
    /// Replace the configured ratios. Sets not summing to 1 are rescaled.
    Set {
        #[arg(long, default_value = "portfolio.toml")]
        portfolio: PathBuf,

        /// Ratios as TICKER=PERCENT, with `:frac` for fractional assets (e.g. ETH=0.4:frac).
        #[arg(required = true, value_parser = parse_ratio_arg)]
        ratios: Vec<HoldingRatio>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Rebalance {
            portfolio,
            min_drift,
            min_single_drift,
            execute,
            json,
        } => run_rebalance(&portfolio, min_drift, min_single_drift, execute, json),
        Commands::Simulate {
            portfolio,
            prices,
            start,
            end,
            cadence,
            currency,
            report,
            sequential,
        } => run_simulate(
            &portfolio, &prices, &start, &end, cadence, &currency, report, sequential,
        ),
        Commands::Search {
            config,
            portfolio,
            prices,
            save_best,
        } => run_search_cmd(&config, &portfolio, &prices, save_best),
        Commands::Ratios { action } => match action {
            RatiosAction::Show { portfolio } => run_ratios_show(&portfolio),
            RatiosAction::Set { portfolio, ratios } => run_ratios_set(&portfolio, &ratios),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// `TICKER=PERCENT` or `TICKER=PERCENT:frac`.
fn parse_ratio_arg(raw: &str) -> Result<HoldingRatio, String> {
    let (ticker, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TICKER=PERCENT, got '{raw}'"))?;
    let (percent, fractional) = match rest.split_once(':') {
        Some((percent, "frac")) => (percent, true),
        Some((_, flag)) => return Err(format!("unknown flag '{flag}' in '{raw}'")),
        None => (rest, false),
    };
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(format!("missing ticker in '{raw}'"));
    }
    let percent: f64 = percent
        .trim()
        .parse()
        .map_err(|e| format!("bad percent in '{raw}': {e}"))?;
    Ok(HoldingRatio::new(ticker.to_ascii_uppercase(), percent, fractional))
}

fn run_rebalance(
    portfolio: &Path,
    min_drift: f64,
    min_single_drift: f64,
    execute: bool,
    json: bool,
) -> Result<()> {
    let file = PortfolioFile::new(portfolio);
    let snapshot = file
        .read()
        .with_context(|| format!("read portfolio {}", portfolio.display()))?;
    let assets = file.owned_assets()?;
    let ratios = file.load_ratios()?;
    let prices: PriceIndex = file.current_prices()?.into_iter().collect();

    let calculator = RebalanceCalculator::new(assets, ratios, prices)
        .context("portfolio cannot be rebalanced")?;

    println!();
    println!("=== Portfolio ===");
    println!("Total value:    {:.8} {BTC}", calculator.total_value(BTC));
    if !snapshot.base_currency.eq_ignore_ascii_case(BTC) {
        println!(
            "                {:.2} {}",
            calculator.total_value(&snapshot.base_currency),
            snapshot.base_currency
        );
    }
    println!("Aggregate drift: {:.4}", calculator.drift_percent());
    for drift in calculator.drifts() {
        println!("  {:<8} {:+.4}", drift.ticker, drift.drift);
    }

    let gated = min_drift > 0.0 || min_single_drift > 0.0;
    if gated && !calculator.should_rebalance(min_drift, min_single_drift) {
        println!();
        println!("Within drift thresholds, nothing to do.");
        return Ok(());
    }

    let plan = calculator.plan_orders();
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!();
        println!("--- Plan (sells first) ---");
        if plan.is_empty() {
            println!("  (no trades)");
        }
        for intent in &plan {
            let side = format!("{:?}", intent.side);
            println!("  {side:<4} {:>16.8} {}", intent.quantity, intent.ticker);
        }
    }

    if execute {
        let venue = PaperSubmitter::new();
        let report = execute_plan(&plan, &venue);
        println!();
        println!("Submitted {} of {} orders to paper venue", report.receipts.len(), plan.len());
        if let Some(err) = report.error {
            bail!("execution stopped: {err}");
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_simulate(
    portfolio: &Path,
    prices: &Path,
    start: &str,
    end: &str,
    cadence: Option<u32>,
    currency: &str,
    report: Option<PathBuf>,
    sequential: bool,
) -> Result<()> {
    let start = parse_timestamp(start).with_context(|| format!("bad --start '{start}'"))?;
    let end = parse_timestamp(end).with_context(|| format!("bad --end '{end}'"))?;

    let file = PortfolioFile::new(portfolio);
    let assets = file.owned_assets()?;
    let ratios = file.load_ratios()?;
    let store = CsvPriceStore::from_path(prices)
        .with_context(|| format!("load price history {}", prices.display()))?;

    let results: Vec<AnalysisResult> = match cadence {
        Some(days) => vec![run_simulation(
            &store, &ratios, &assets, days, start, end, currency,
        )?],
        None => {
            let tickers = ratios.iter().map(|r| r.ticker.as_str());
            let history = PriceHistory::load(&store, tickers, currency, start, end)?;
            HistoricalSimulator::new(history)
                .with_parallelism(!sequential)
                .run_cadence_sweep(&ratios, &assets, DEFAULT_CADENCES)?
        }
    };

    match report {
        Some(path) => {
            let out = std::fs::File::create(&path)
                .with_context(|| format!("create report {}", path.display()))?;
            ReportWriter::new(BufWriter::new(out)).write_batch(&results)?;
            println!("Report written to: {}", path.display());
        }
        None => ReportWriter::new(io::stdout().lock()).write_batch(&results)?,
    }
    Ok(())
}

fn run_search_cmd(config: &Path, portfolio: &Path, prices: &Path, save_best: bool) -> Result<()> {
    let config = SearchConfig::from_file(config)?;
    let file = PortfolioFile::new(portfolio);
    let assets = file.owned_assets()?;
    let existing = file.load_ratios()?;
    let store = CsvPriceStore::from_path(prices)
        .with_context(|| format!("load price history {}", prices.display()))?;

    let mut strategy = RandomSearch::new(config.rng_hierarchy());
    let outcome = run_search(&config, &store, &assets, &existing, &mut strategy)?;

    println!();
    println!("=== Search Result ===");
    println!("Trials:         {}", outcome.trials);
    println!("Simulations:    {}", outcome.results.len());
    println!();
    println!("--- Leaderboard ---");
    for (rank, entry) in outcome.leaderboard.entries().iter().enumerate() {
        println!(
            "{:>3}. trial {:<5} every {:>2} days  {:.4} BTC  (profit {:+.4})",
            rank + 1,
            entry.trial,
            entry.result.cadence_days,
            entry.result.final_value_btc,
            entry.result.profit_btc()
        );
    }

    let Some(best) = outcome.best else {
        bail!("search produced no results");
    };
    println!();
    println!("Best ratios (every {} days):", best.cadence_days);
    for ratio in &best.ratios {
        println!("  {:<8} {:.4}%", ratio.ticker, ratio.percent * 100.0);
    }

    if save_best {
        let stored = file.save_ratios(&best.ratios)?;
        println!("Saved {} ratios to {}", stored.len(), portfolio.display());
    }
    Ok(())
}

fn run_ratios_show(portfolio: &Path) -> Result<()> {
    let ratios = PortfolioFile::new(portfolio).load_ratios()?;
    print_ratios(&ratios);
    if let Err(e) = validate_ratios(&ratios) {
        println!();
        println!("Warning: {e}");
    }
    Ok(())
}

fn run_ratios_set(portfolio: &Path, ratios: &[HoldingRatio]) -> Result<()> {
    let corrected = correct_ratios(ratios);
    validate_ratios(&corrected).context("rejected ratio set")?;
    let stored = PortfolioFile::new(portfolio).save_ratios(&corrected)?;
    print_ratios(&stored);
    Ok(())
}

fn print_ratios(ratios: &[HoldingRatio]) {
    if ratios.is_empty() {
        println!("(no ratios configured)");
        return;
    }
    for ratio in ratios {
        let frac = if ratio.fractional { "fractional" } else { "whole units" };
        println!("  {:<8} {:>8.4}%  {frac}", ratio.ticker, ratio.percent * 100.0);
    }
}
