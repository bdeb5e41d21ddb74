//! RatioLab Runner — ratio search orchestration, file-backed portfolio, history.
//!
//! This crate builds on `ratiolab-core` to provide:
//! - TOML search configuration
//! - A TOML portfolio snapshot acting as exchange and ratio store
//! - Pluggable search strategies with a seeded random search
//! - Multi-trial search loop with rayon parallelism
//! - JSONL result history and a top-N leaderboard

pub mod config;
pub mod history;
pub mod leaderboard;
pub mod portfolio_file;
pub mod search;

pub use config::{SearchConfig, SearchConfigError};
pub use history::{HistoryEntry, ResultHistory};
pub use leaderboard::{InsertResult, Leaderboard, LeaderboardEntry};
pub use portfolio_file::{PortfolioFile, PortfolioSnapshot, PriceEntry};
pub use search::{run_search, RandomSearch, SearchOutcome, SearchStrategy};
