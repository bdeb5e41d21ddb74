//! Leaderboard — bounded, sorted list of the best analysis results.
//!
//! Ranked by final BTC value, highest first. Equal values prefer the lower
//! cadence (fewer trades for the same outcome), then the earlier trial.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use ratiolab_core::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub trial: u64,
    pub result: AnalysisResult,
}

/// Outcome of an insert operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    /// Not good enough, or a non-finite value.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
    max_size: usize,
}

/// Better result first: higher final BTC value, then the lower cadence.
pub(crate) fn compare_results(a: &AnalysisResult, b: &AnalysisResult) -> Ordering {
    b.final_value_btc
        .total_cmp(&a.final_value_btc)
        .then_with(|| a.cadence_days.cmp(&b.cadence_days))
}

fn rank(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    compare_results(&a.result, &b.result).then_with(|| a.trial.cmp(&b.trial))
}

impl Leaderboard {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Insert an entry, trimming the worst when over capacity.
    pub fn insert(&mut self, entry: LeaderboardEntry) -> InsertResult {
        if !entry.result.final_value_btc.is_finite() || self.max_size == 0 {
            return InsertResult::Skipped;
        }

        if self.entries.len() >= self.max_size {
            match self.entries.last() {
                Some(worst) if rank(&entry, worst) == Ordering::Less => {
                    self.entries.pop();
                }
                _ => return InsertResult::Skipped,
            }
        }

        let at = self
            .entries
            .partition_point(|e| rank(e, &entry) != Ordering::Greater);
        self.entries.insert(at, entry);
        InsertResult::Inserted
    }

    /// Offer every result of one trial.
    pub fn extend_trial(&mut self, trial: u64, results: &[AnalysisResult]) -> usize {
        results
            .iter()
            .filter(|result| {
                self.insert(LeaderboardEntry {
                    trial,
                    result: (*result).clone(),
                }) == InsertResult::Inserted
            })
            .count()
    }

    pub fn best(&self) -> Option<&LeaderboardEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
