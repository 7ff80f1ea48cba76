//! JSON-loadable configuration of an analysis and its trial batches.

use crate::analysis::{LlhRatioAnalysis, TimeIntegratedSingleSourceAnalysis};
use crate::minimizer::{Minimizer, MinimizerConfig};
use serde::{Deserialize, Serialize};
use sky_core::{Error, RandomStateService, Result, TimeLord, TrialTable};
use std::path::Path;

/// Settings of a batch of trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialsConfig {
    /// Seed of the random-state service; `None` seeds from the operating system.
    pub seed: Option<u64>,
    /// Default worker count; `0` lets Rayon decide.
    pub ncpu: usize,
    /// Number of trials per batch.
    pub n_trials: usize,
    /// Mean number of injected signal events.
    pub sig_mean: f64,
    /// Background mean per dataset; `None` entries use the generation method's default.
    pub bkg_mean_list: Option<Vec<Option<f64>>>,
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self { seed: None, ncpu: 0, n_trials: 100, sig_mean: 0.0, bkg_mean_list: None }
    }
}

impl TrialsConfig {
    /// Random-state service seeded from [`TrialsConfig::seed`].
    pub fn random_state_service(&self) -> RandomStateService {
        RandomStateService::new(self.seed)
    }

    fn validate(&self) -> Result<()> {
        if !self.sig_mean.is_finite() || self.sig_mean < 0.0 {
            return Err(Error::Validation(format!(
                "sig_mean must be finite and >= 0, got {}",
                self.sig_mean
            )));
        }
        if let Some(means) = &self.bkg_mean_list
            && let Some(bad) = means.iter().flatten().find(|m| !m.is_finite() || **m < 0.0)
        {
            return Err(Error::Validation(format!(
                "background means must be finite and >= 0, got {bad}"
            )));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimizer settings.
    pub minimizer: MinimizerConfig,
    /// Trial batch settings.
    pub trials: TrialsConfig,
}

impl AnalysisConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.trials.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Minimizer built from [`AnalysisConfig::minimizer`].
    pub fn build_minimizer(&self) -> Minimizer {
        Minimizer::new(self.minimizer.clone())
    }

    /// Install the configured minimizer on `analysis`.
    pub fn configure(
        &self,
        analysis: TimeIntegratedSingleSourceAnalysis,
    ) -> TimeIntegratedSingleSourceAnalysis {
        analysis.with_minimizer(self.build_minimizer())
    }

    /// Run one batch of [`TrialsConfig::n_trials`] trials on a constructed analysis,
    /// seeded from [`TrialsConfig::seed`] and using the configured means and worker count.
    pub fn run_trials<A: LlhRatioAnalysis + ?Sized>(
        &self,
        analysis: &A,
        tl: Option<&TimeLord>,
    ) -> Result<TrialTable> {
        let trials = &self.trials;
        let mut rss = trials.random_state_service();
        log::info!(
            "trial batch: n_trials={}, sig_mean={}, seed={:?}",
            trials.n_trials,
            trials.sig_mean,
            trials.seed
        );
        analysis.do_trials(
            &mut rss,
            trials.n_trials,
            trials.bkg_mean_list.as_deref(),
            trials.sig_mean,
            Some(trials.ncpu),
            tl,
        )
    }

    /// Install process-wide defaults (the worker count used when a batch passes none).
    pub fn apply_global(&self) {
        crate::trials::set_default_ncpu(self.trials.ncpu);
        log::debug!("default trial worker count set to {}", self.trials.ncpu);
    }
}
