//! Collaborators the engine talks to: the exchange snapshot, the ratio
//! configuration store and the order venue.
//!
//! The engine never reaches a venue on its own. Callers decide whether a plan
//! is executed through [`execute_plan`] or only reported.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{correct_ratios, HoldingRatio, OwnedAsset, PriceQuote};
use crate::rebalance::{OrderSide, TradeIntent};

/// Result alias shared by the exchange and ratio-store traits.
pub type VenueResult<T> = Result<T, VenueError>;

/// Live prices and balances.
pub trait ExchangeProvider: Send + Sync {
    fn current_prices(&self) -> VenueResult<Vec<PriceQuote>>;

    /// Holdings, already filtered to non-dust balances.
    fn owned_assets(&self) -> VenueResult<Vec<OwnedAsset>>;
}

/// Persistent target ratios.
pub trait RatioStore: Send + Sync {
    fn load_ratios(&self) -> VenueResult<Vec<HoldingRatio>>;

    /// Replace the stored set and return it as stored.
    ///
    /// Tickers absent from `ratios` are removed.
    fn save_ratios(&self, ratios: &[HoldingRatio]) -> VenueResult<Vec<HoldingRatio>>;
}

/// Failure reported by an exchange or ratio store.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("order for {ticker} rejected: {reason}")]
    Rejected { ticker: String, reason: String },

    #[error("insufficient funds to {side:?} {quantity} {ticker}")]
    InsufficientFunds {
        ticker: String,
        side: OrderSide,
        quantity: f64,
    },

    #[error("order venue unavailable: {0}")]
    Unavailable(String),
}

/// Acknowledgement of one submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: u64,
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub submitted_at: DateTime<Utc>,
}

pub trait OrderSubmitter: Send + Sync {
    fn submit(&self, intent: &TradeIntent) -> Result<OrderReceipt, OrderError>;
}

/// Submissions up to the first failure.
#[derive(Debug)]
pub struct ExecutionReport {
    pub receipts: Vec<OrderReceipt>,
    pub error: Option<OrderError>,
}

impl ExecutionReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Submit a plan in order, stopping at the first rejected order.
///
/// Plans from [`crate::rebalance::plan_orders`] carry sells first, so a failed
/// buy never leaves an earlier sell unexecuted.
pub fn execute_plan(plan: &[TradeIntent], submitter: &dyn OrderSubmitter) -> ExecutionReport {
    let mut receipts = Vec::with_capacity(plan.len());
    for intent in plan {
        match submitter.submit(intent) {
            Ok(receipt) => {
                info!(
                    order_id = receipt.order_id,
                    ticker = %receipt.ticker,
                    side = ?receipt.side,
                    quantity = receipt.quantity,
                    "order submitted"
                );
                receipts.push(receipt);
            }
            Err(e) => {
                warn!(ticker = %intent.ticker, error = %e, "order failed, stopping plan");
                return ExecutionReport {
                    receipts,
                    error: Some(e),
                };
            }
        }
    }
    ExecutionReport {
        receipts,
        error: None,
    }
}

/// Venue that accepts every order and keeps a log of what it saw.
#[derive(Debug, Default)]
pub struct PaperSubmitter {
    submitted: Mutex<Vec<TradeIntent>>,
}

impl PaperSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intents accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<TradeIntent> {
        match self.submitted.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OrderSubmitter for PaperSubmitter {
    fn submit(&self, intent: &TradeIntent) -> Result<OrderReceipt, OrderError> {
        let mut log = self
            .submitted
            .lock()
            .map_err(|_| OrderError::Unavailable("paper log poisoned".into()))?;
        log.push(intent.clone());
        Ok(OrderReceipt {
            order_id: log.len() as u64,
            ticker: intent.ticker.clone(),
            side: intent.side,
            quantity: intent.quantity,
            submitted_at: Utc::now(),
        })
    }
}

/// Ratio store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRatioStore {
    ratios: Mutex<Vec<HoldingRatio>>,
}

impl InMemoryRatioStore {
    pub fn new(ratios: Vec<HoldingRatio>) -> Self {
        Self {
            ratios: Mutex::new(ratios),
        }
    }
}

impl RatioStore for InMemoryRatioStore {
    fn load_ratios(&self) -> VenueResult<Vec<HoldingRatio>> {
        self.ratios
            .lock()
            .map(|r| r.clone())
            .map_err(|_| VenueError::Unavailable("ratio store poisoned".into()))
    }

    fn save_ratios(&self, ratios: &[HoldingRatio]) -> VenueResult<Vec<HoldingRatio>> {
        let mut stored = self
            .ratios
            .lock()
            .map_err(|_| VenueError::Unavailable("ratio store poisoned".into()))?;
        *stored = correct_ratios(ratios);
        Ok(stored.clone())
    }
}
