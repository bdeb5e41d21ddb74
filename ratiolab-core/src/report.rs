//! Plain-text rendering of simulation results.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::simulator::AnalysisResult;

const RULE: &str =
    "---------------------------------------------------------------------------------------------";

pub struct ReportFormatter;

impl ReportFormatter {
    /// One block per result: dates, cadence, target ratios, final holdings and
    /// the initial/final BTC value.
    pub fn format_result(&self, result: &AnalysisResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(
            out,
            "Dates: {} - {}",
            result.start.format("%Y-%m-%d %H:%M:%S"),
            result.end.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "Frequency: {} days", result.cadence_days);

        out.push_str("Holding Ratios: \n");
        for ratio in &result.ratios {
            let _ = writeln!(out, "    {}: {:.4}", ratio.ticker, ratio.percent * 100.0);
        }

        out.push_str("Final owned assets:\n");
        for asset in &result.final_assets {
            let _ = writeln!(out, "    {}: {:.4}", asset.ticker, asset.quantity());
        }

        let _ = writeln!(out, "Initial Bitcoin: {:.4}", result.initial_value_btc);
        let _ = writeln!(
            out,
            "Total Bitcoin: {:.4} ({} {:.2})",
            result.final_value_btc, result.report_currency, result.final_value_report
        );
        let _ = writeln!(out, "Profit: {:.4}", result.profit_btc());
        out
    }

    /// Trailer naming the best final BTC value of a batch.
    pub fn best_result_line(&self, results: &[AnalysisResult]) -> String {
        let best = results
            .iter()
            .map(|r| r.final_value_btc)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0);
        format!("****** Best result: {best:.4}\n")
    }
}

/// Streams formatted results to any writer (file, stdout, buffer).
pub struct ReportWriter<W: Write> {
    out: W,
    formatter: ReportFormatter,
    written: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            formatter: ReportFormatter,
            written: 0,
        }
    }

    pub fn write_result(&mut self, result: &AnalysisResult) -> io::Result<()> {
        self.out
            .write_all(self.formatter.format_result(result).as_bytes())?;
        self.written += 1;
        Ok(())
    }

    /// Write every result of a batch followed by its best-result trailer.
    pub fn write_batch(&mut self, results: &[AnalysisResult]) -> io::Result<()> {
        for result in results {
            self.write_result(result)?;
        }
        self.out
            .write_all(self.formatter.best_result_line(results).as_bytes())?;
        self.out.flush()
    }

    /// Number of result blocks written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
