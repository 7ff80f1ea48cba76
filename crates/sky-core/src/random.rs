//! Explicitly passed, reproducible random-number source.
//!
//! Every stochastic operation in SkyStat takes a `&mut RandomStateService`; nothing
//! draws from a process-wide generator. Batches of trials derive one independent
//! substream per trial from a single draw of the caller's service, so the outcome
//! of a batch depends only on the seed and the trial index, never on the thread
//! that ran it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Golden-ratio increment used to spread substream seeds.
const SUBSTREAM_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seedable random-state service wrapping a [`StdRng`].
#[derive(Debug, Clone)]
pub struct RandomStateService {
    seed: Option<u64>,
    rng: StdRng,
}

impl RandomStateService {
    /// Create a service. `None` seeds from the operating system (not reproducible).
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self { seed, rng }
    }

    /// Create a reproducible service from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// Seed the service was created (or last re-seeded) with.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Reset the stream to the beginning of `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Mutable access to the underlying generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Derive `n` independent substreams.
    ///
    /// Consumes exactly one `u64` from this service. Substream `i` is seeded with
    /// `base ^ (i * stride)` mixed through `splitmix64`, so the set of substreams is a
    /// pure function of this service's state and `n`.
    pub fn derive_substreams(&mut self, n: usize) -> Vec<RandomStateService> {
        let base: u64 = self.rng.random();
        (0..n as u64)
            .map(|i| RandomStateService::from_seed(derive_seed(base, i)))
            .collect()
    }
}

impl Default for RandomStateService {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Seed of substream `index` for a given base seed.
pub fn derive_seed(base: u64, index: u64) -> u64 {
    splitmix64(base ^ index.wrapping_mul(SUBSTREAM_STRIDE))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(SUBSTREAM_STRIDE);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
