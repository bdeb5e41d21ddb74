//! Ratio sampler — random target-ratio vectors for historical exploration.
//!
//! One uniform draw in `[0, 1)` per asset, divided by the sum of the draws,
//! so the sampled percents sum to 1.0 by construction.

use rand::Rng;

use crate::domain::{find_ratio, HoldingRatio, OwnedAsset};

/// Normalized random weights: `n` values in `[0, 1]` summing to 1.0.
///
/// In the (practically impossible) case that every draw is exactly zero the
/// weights fall back to an equal split.
pub fn random_weights<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let draws: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let total: f64 = draws.iter().sum();
    if total <= 0.0 {
        return vec![1.0 / n as f64; n];
    }
    draws.into_iter().map(|d| d / total).collect()
}

/// Sample one random ratio per asset.
///
/// The `fractional` flag is copied from `existing` when the ticker is already
/// configured; unknown tickers are assumed to trade in whole units only.
pub fn sample<R: Rng + ?Sized>(
    rng: &mut R,
    assets: &[OwnedAsset],
    existing: &[HoldingRatio],
) -> Vec<HoldingRatio> {
    let weights = random_weights(rng, assets.len());
    assets
        .iter()
        .zip(weights)
        .map(|(asset, percent)| {
            let fractional = find_ratio(existing, &asset.ticker)
                .map(|r| r.fractional)
                .unwrap_or(false);
            HoldingRatio::new(asset.ticker.clone(), percent, fractional)
        })
        .collect()
}

/// Random ratio generator bound to a caller-supplied RNG.
///
/// Holds the RNG so repeated draws continue one reproducible stream.
#[derive(Debug, Clone)]
pub struct RatioSampler<R> {
    rng: R,
}

impl<R: Rng> RatioSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn sample(&mut self, assets: &[OwnedAsset], existing: &[HoldingRatio]) -> Vec<HoldingRatio> {
        sample(&mut self.rng, assets, existing)
    }

    pub fn into_inner(self) -> R {
        self.rng
    }
}
