//! # sky-inference
//!
//! Hypothesis testing on top of `sky-llh`.
//!
//! This crate provides:
//! - Bounded L-BFGS minimization (argmin) with randomized restarts.
//! - Background and signal pseudo-data generators.
//! - The [`LlhRatioAnalysis`] lifecycle and the time-integrated single-source analysis.
//! - A Rayon-parallel, seed-reproducible trial runner.
//! - Test statistics and trial-based significances.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod background;
pub mod config;
pub mod minimizer;
pub mod optimizer;
pub mod sampling;
pub mod signal;
pub mod significance;
pub mod test_statistic;
pub mod trials;

pub use analysis::{
    AnalysisCore, AnalysisState, LlhRatioAnalysis, Maximization, PdfRatioAttachment, PseudoData,
    TimeIntegratedSingleSourceAnalysis, TrialResult,
};
pub use background::{
    BackgroundGenerationMethod, BackgroundGenerator, DataScramblingMethod,
    ScrambledExpDataBkgGenMethod, UniformRaScramblingMethod,
};
pub use config::{AnalysisConfig, TrialsConfig};
pub use minimizer::{Minimizer, MinimizerConfig, MinimizerStatus, Minimum};
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use signal::SignalGenerator;
pub use significance::{empirical_pvalue, pvalue_to_sigma, wilks_half_chi2_pvalue};
pub use test_statistic::{TestStatistic, TestStatisticWilks, wilks_ts};
pub use trials::{get_ncpu, run_trials, set_default_ncpu};
