//! Detector signal yields: expected number of detected signal events for a source
//! hypothesis.

use crate::binning::Binning;
use crate::dataset::{Dataset, DatasetData};
use crate::flux::{FluxModel, PowerLawFlux};
use crate::source::{PointLikeSource, SourceParams};
use sky_core::{Error, Result};
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Expected signal yield of one dataset as a function of source and source parameters.
pub trait DetSigYield: Send + Sync + fmt::Debug {
    /// Source parameters the yield depends on, in gradient order.
    fn param_names(&self) -> &[String];

    /// Yield `Y` and `dY/dp` for every parameter of [`DetSigYield::param_names`].
    fn value_and_grad(&self, source: &PointLikeSource, params: &SourceParams)
    -> Result<(f64, Vec<f64>)>;
}

/// Factory building a [`DetSigYield`] for one dataset and flux model.
pub trait DetSigYieldImplMethod: Send + Sync + fmt::Debug {
    /// Whether this method can build a yield for `fluxmodel`.
    fn supports_fluxmodel(&self, fluxmodel: &dyn FluxModel) -> bool;

    /// Build the yield of `dataset` for `fluxmodel` and the given livetime.
    fn construct_detsigyield(
        &self,
        dataset: &Dataset,
        data: &DatasetData,
        fluxmodel: &dyn FluxModel,
        livetime_days: f64,
    ) -> Result<Arc<dyn DetSigYield>>;
}

/// Power-law yield tabulated in `sin(true_dec)` on a grid of spectral indices.
#[derive(Debug, Clone)]
pub struct PowerLawDetSigYieldImplMethod {
    sin_dec_binning: Binning,
    gamma_grid: Vec<f64>,
}

impl Default for PowerLawDetSigYieldImplMethod {
    fn default() -> Self {
        Self {
            sin_dec_binning: Binning::uniform(-1.0, 1.0, 20),
            gamma_grid: (0..=30).map(|i| 1.0 + 0.1 * i as f64).collect(),
        }
    }
}

impl PowerLawDetSigYieldImplMethod {
    /// Create with explicit `sin(dec)` binning and spectral-index grid (at least two
    /// strictly increasing nodes).
    pub fn new(sin_dec_binning: Binning, gamma_grid: Vec<f64>) -> Result<Self> {
        if gamma_grid.len() < 2
            || gamma_grid.iter().any(|g| !g.is_finite())
            || gamma_grid.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(Error::Validation(
                "gamma grid needs at least two finite, strictly increasing nodes".into(),
            ));
        }
        if sin_dec_binning.lower() < -1.0 || sin_dec_binning.upper() > 1.0 {
            return Err(Error::Validation("sin(dec) binning must lie within [-1, 1]".into()));
        }
        Ok(Self { sin_dec_binning, gamma_grid })
    }
}

impl DetSigYieldImplMethod for PowerLawDetSigYieldImplMethod {
    fn supports_fluxmodel(&self, fluxmodel: &dyn FluxModel) -> bool {
        fluxmodel.as_power_law().is_some()
    }

    fn construct_detsigyield(
        &self,
        dataset: &Dataset,
        data: &DatasetData,
        fluxmodel: &dyn FluxModel,
        livetime_days: f64,
    ) -> Result<Arc<dyn DetSigYield>> {
        let flux = *fluxmodel.as_power_law().ok_or_else(|| {
            Error::Configuration(format!(
                "power-law detector signal yield does not support flux model '{}'",
                fluxmodel.math_function_str()
            ))
        })?;
        if !livetime_days.is_finite() || livetime_days <= 0.0 {
            return Err(Error::Validation(format!("livetime must be positive, got {livetime_days}")));
        }

        let mc = data.mc();
        let true_dec = mc.require_column("true_dec")?;
        let true_energy = mc.require_column("true_energy")?;
        let mcweight = mc.require_column("mcweight")?;
        let sin_true_dec: Vec<f64> = true_dec.iter().map(|d| d.sin()).collect();
        let bins: Vec<usize> =
            sin_true_dec.iter().map(|&s| self.sin_dec_binning.clamped_bin(s)).collect();

        let livetime_s = livetime_days * SECONDS_PER_DAY;
        let n_bins = self.sin_dec_binning.n_bins();
        let mut log_yield = Vec::with_capacity(self.gamma_grid.len());
        for &gamma in &self.gamma_grid {
            let mut h = vec![0.0; n_bins];
            for ((&b, &e), &w) in bins.iter().zip(true_energy).zip(mcweight) {
                h[b] += w * (e / flux.e0()).powf(-gamma);
            }
            let row: Vec<f64> = h
                .iter()
                .enumerate()
                .map(|(b, &v)| {
                    let y = flux.phi0() * livetime_s * v / (TAU * self.sin_dec_binning.width(b));
                    if y > 0.0 { y.ln() } else { f64::NEG_INFINITY }
                })
                .collect();
            log_yield.push(row);
        }

        log::debug!(
            "constructed power-law detector signal yield for dataset '{}' ({} MC events, {} gamma nodes)",
            dataset.name(),
            mc.n_events(),
            self.gamma_grid.len()
        );

        Ok(Arc::new(PowerLawDetSigYield {
            flux,
            sin_dec_binning: self.sin_dec_binning.clone(),
            gamma_grid: self.gamma_grid.clone(),
            log_yield,
            param_names: vec!["gamma".to_string()],
        }))
    }
}

/// Tabulated power-law yield. Interpolates linearly in `sin(dec)` between bin centers
/// and linearly in `ln Y` between spectral-index nodes.
#[derive(Debug, Clone)]
pub struct PowerLawDetSigYield {
    flux: PowerLawFlux,
    sin_dec_binning: Binning,
    gamma_grid: Vec<f64>,
    log_yield: Vec<Vec<f64>>,
    param_names: Vec<String>,
}

impl PowerLawDetSigYield {
    /// Yield and `dY/dγ` of a single `sin(dec)` bin.
    fn bin_value_and_grad(&self, bin: usize, gamma: f64) -> (f64, f64) {
        let grid = &self.gamma_grid;
        let last = grid.len() - 1;
        let outside = gamma < grid[0] || gamma > grid[last];
        let g = gamma.clamp(grid[0], grid[last]);
        let k = grid.partition_point(|&x| x <= g).saturating_sub(1).min(last - 1);
        let dg = grid[k + 1] - grid[k];
        let t = (g - grid[k]) / dg;

        let l0 = self.log_yield[k][bin];
        let l1 = self.log_yield[k + 1][bin];
        if !l0.is_finite() || !l1.is_finite() {
            return (0.0, 0.0);
        }
        let y = ((1.0 - t) * l0 + t * l1).exp();
        let dy = if outside { 0.0 } else { y * (l1 - l0) / dg };
        (y, dy)
    }
}

impl DetSigYield for PowerLawDetSigYield {
    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn value_and_grad(
        &self,
        source: &PointLikeSource,
        params: &SourceParams,
    ) -> Result<(f64, Vec<f64>)> {
        let gamma = if params.contains("gamma") { params.get("gamma")? } else { self.flux.gamma() };
        if !gamma.is_finite() {
            return Err(Error::Computation(format!("non-finite spectral index {gamma}")));
        }
        let (i, j, t) = self.sin_dec_binning.center_interpolation(source.dec().sin());
        let (yi, dyi) = self.bin_value_and_grad(i, gamma);
        let (yj, dyj) = self.bin_value_and_grad(j, gamma);
        Ok(((1.0 - t) * yi + t * yj, vec![(1.0 - t) * dyi + t * dyj]))
    }
}
