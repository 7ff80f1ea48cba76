//! Random draws shared by the event generators.

use rand::Rng;
use rand::distr::Uniform;
use rand_distr::{Distribution, Poisson};
use sky_core::{Error, Result};

/// Draw a Poisson count. A zero mean gives 0; negative or non-finite means are an error.
pub fn poisson_count<R: Rng>(rng: &mut R, mean: f64) -> Result<u64> {
    if !mean.is_finite() || mean < 0.0 {
        return Err(Error::Validation(format!("Poisson mean must be finite and >= 0, got {mean}")));
    }
    if mean == 0.0 {
        return Ok(0);
    }
    let pois = Poisson::new(mean)
        .map_err(|e| Error::Validation(format!("invalid Poisson mean {mean}: {e}")))?;
    let k: f64 = pois.sample(rng);
    Ok(k as u64)
}

/// `n` indices drawn uniformly with replacement from `0..len`.
pub fn indices_with_replacement<R: Rng>(rng: &mut R, len: usize, n: usize) -> Result<Vec<usize>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let dist = Uniform::new(0, len)
        .map_err(|e| Error::Validation(format!("cannot sample {n} events from {len}: {e}")))?;
    Ok((0..n).map(|_| dist.sample(rng)).collect())
}
