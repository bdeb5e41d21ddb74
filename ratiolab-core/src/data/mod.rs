//! Historical price storage.
//!
//! - `store`: the `HistoricalPriceStore` trait, error type and in-memory store
//! - `csv_store`: CSV import into the in-memory store

pub mod csv_store;
pub mod store;

pub use csv_store::CsvPriceStore;
pub use store::{DataError, HistoricalPriceStore, InMemoryPriceStore};
