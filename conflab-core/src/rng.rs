//! Deterministic seeding for EnbPI bootstrap resampling.
//!
//! A pinned seed is used verbatim. Otherwise the seed is derived by BLAKE3
//! hashing `(symbol, date_t, method, ensemble_size)`, so every historical
//! calibration can be replayed exactly from its provenance.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Where an EnbPI run gets its seed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Operator-pinned seed.
    Fixed(u64),
    /// Derived from the calibration identity.
    Derived,
}

impl SeedPolicy {
    pub fn from_config(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => SeedPolicy::Fixed(s),
            None => SeedPolicy::Derived,
        }
    }

    /// Resolve the seed for one calibration.
    pub fn resolve(&self, symbol: &str, date_t: NaiveDate, method: &str, ensemble_size: u32) -> u64 {
        match self {
            SeedPolicy::Fixed(seed) => *seed,
            SeedPolicy::Derived => derive_seed(symbol, date_t, method, ensemble_size),
        }
    }
}

/// Order-independent seed derivation.
///
/// Fields are length-prefixed so `("AB", "C")` and `("A", "BC")` never collide.
pub fn derive_seed(symbol: &str, date_t: NaiveDate, method: &str, ensemble_size: u32) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for field in [symbol.as_bytes(), date_t.to_string().as_bytes(), method.as_bytes()] {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    hasher.update(&ensemble_size.to_le_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Seeded generator for one bootstrap run.
pub fn rng_for(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
