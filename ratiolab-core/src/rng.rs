//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(label, trial)`
//! pair. Sub-seeds are derived via BLAKE3 hashing, independently of thread
//! scheduling order, so a parallel ratio search samples exactly the same
//! ratio vectors as a sequential one.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic RNG hierarchy.
#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Hierarchy seeded from OS entropy (non-reproducible runs).
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific (label, trial).
    pub fn sub_seed(&self, label: &str, trial: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(label.as_bytes());
        hasher.update(&trial.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng for a (label, trial).
    pub fn rng_for(&self, label: &str, trial: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(label, trial))
    }
}
