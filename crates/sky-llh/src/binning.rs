//! One-dimensional binnings and histogram lookups.

use sky_core::{Error, Result};

/// Strictly increasing, finite bin edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Binning {
    edges: Vec<f64>,
}

impl Binning {
    /// Create a binning from explicit edges.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::Validation("binning requires at least two edges".into()));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(Error::Validation("bin edges must be finite".into()));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::Validation("bin edges must be strictly increasing".into()));
        }
        Ok(Self { edges })
    }

    /// `n_bins` equal-width bins on `[lo, hi]`.
    pub fn linspace(lo: f64, hi: f64, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::Validation("binning requires at least one bin".into()));
        }
        let w = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|i| lo + w * i as f64).collect();
        edges[n_bins] = hi;
        Self::new(edges)
    }

    /// Equal-width binning from constants known to be valid (`n_bins > 0`, `lo < hi`).
    pub(crate) fn uniform(lo: f64, hi: f64, n_bins: usize) -> Self {
        let w = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|i| lo + w * i as f64).collect();
        edges[n_bins] = hi;
        Self { edges }
    }

    /// Bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower edge of the first bin.
    pub fn lower(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin.
    pub fn upper(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Width of bin `i`.
    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Bin centers.
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Bin containing `x`, with the upper edge belonging to the last bin.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.lower() && x <= self.upper()) {
            return None;
        }
        let idx = self.edges.partition_point(|&e| e <= x);
        Some(idx.saturating_sub(1).min(self.n_bins() - 1))
    }

    /// Bin containing `x`, clamping out-of-range values to the first or last bin.
    pub fn clamped_bin(&self, x: f64) -> usize {
        if x.is_nan() || x <= self.lower() {
            return 0;
        }
        self.find_bin(x).unwrap_or(self.n_bins() - 1)
    }

    /// Linear interpolation weights of `x` between adjacent bin centers.
    ///
    /// Returns `(i, j, t)` such that the interpolated value is `(1 - t) h[i] + t h[j]`.
    /// Outside the outermost centers the value is held constant.
    pub fn center_interpolation(&self, x: f64) -> (usize, usize, f64) {
        let n = self.n_bins();
        let centers = self.centers();
        if n == 1 || x <= centers[0] {
            return (0, 0, 0.0);
        }
        if x >= centers[n - 1] {
            return (n - 1, n - 1, 0.0);
        }
        let j = centers.partition_point(|&c| c <= x);
        let i = j - 1;
        let t = (x - centers[i]) / (centers[j] - centers[i]);
        (i, j, t)
    }

    /// Event counts per bin; values outside the range are clamped into the edge bins.
    pub fn histogram(&self, values: &[f64], weights: Option<&[f64]>) -> Vec<f64> {
        let mut h = vec![0.0; self.n_bins()];
        for (k, &x) in values.iter().enumerate() {
            let w = weights.map_or(1.0, |w| w[k]);
            h[self.clamped_bin(x)] += w;
        }
        h
    }
}

/// Normalize counts into a density over `binning`, filling empty bins with half of
/// the smallest non-empty density before renormalizing.
///
/// All-empty input yields the uniform density.
pub fn floored_density(binning: &Binning, counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    let range = binning.upper() - binning.lower();
    if total <= 0.0 {
        return vec![1.0 / range; counts.len()];
    }
    let mut dens: Vec<f64> =
        counts.iter().enumerate().map(|(i, c)| c / (total * binning.width(i))).collect();
    let floor = dens.iter().copied().filter(|d| *d > 0.0).fold(f64::INFINITY, f64::min) * 0.5;
    for d in &mut dens {
        if *d <= 0.0 {
            *d = floor;
        }
    }
    let norm: f64 = dens.iter().enumerate().map(|(i, d)| d * binning.width(i)).sum();
    for d in &mut dens {
        *d /= norm;
    }
    dens
}
