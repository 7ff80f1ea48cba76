//! Minimization of an objective over a fit-parameter set, with randomized restarts.

use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
use serde::{Deserialize, Serialize};
use sky_core::{Error, FitParameterSet, RandomStateService, Result};
use std::fmt;

/// Configuration of the [`Minimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerConfig {
    /// Settings of each optimizer run.
    pub optimizer: OptimizerConfig,
    /// Maximum number of restarts from random initial values after a non-converged run.
    pub max_repetitions: usize,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self { optimizer: OptimizerConfig::default(), max_repetitions: 5 }
    }
}

/// Outcome of a minimization, summed over all attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimizerStatus {
    /// Whether the kept attempt converged.
    pub converged: bool,
    /// Iterations over all attempts.
    pub n_iter: u64,
    /// Objective evaluations over all attempts.
    pub n_fev: usize,
    /// Gradient evaluations over all attempts.
    pub n_gev: usize,
    /// Number of restarts performed.
    pub n_repetitions: usize,
    /// Termination message of the kept attempt.
    pub message: String,
}

impl fmt::Display for MinimizerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimizerStatus(converged={}, n_iter={}, n_fev={}, n_gev={}, n_repetitions={}, message={})",
            self.converged, self.n_iter, self.n_fev, self.n_gev, self.n_repetitions, self.message
        )
    }
}

/// Best point found by [`Minimizer::minimize`].
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Best-fit values in fit-parameter-set order.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fmin: f64,
    /// Minimization status.
    pub status: MinimizerStatus,
}

/// Bounded minimizer. Starts from the fit parameters' initial values and, if that run
/// does not converge, restarts from uniformly random initial values drawn from the
/// caller's random-state service, keeping the lowest minimum.
#[derive(Debug, Clone, Default)]
pub struct Minimizer {
    optimizer: LbfgsbOptimizer,
    max_repetitions: usize,
}

impl Minimizer {
    /// Create from configuration.
    pub fn new(config: MinimizerConfig) -> Self {
        Self {
            optimizer: LbfgsbOptimizer::new(config.optimizer),
            max_repetitions: config.max_repetitions,
        }
    }

    /// Maximum number of restarts.
    pub fn max_repetitions(&self) -> usize {
        self.max_repetitions
    }

    /// Minimize `objective` over `fitparamset`.
    pub fn minimize(
        &self,
        rss: &mut RandomStateService,
        fitparamset: &FitParameterSet,
        objective: &dyn ObjectiveFunction,
    ) -> Result<Minimum> {
        if fitparamset.is_empty() {
            return Err(Error::Validation("cannot minimize over an empty fit parameter set".into()));
        }
        let bounds = fitparamset.bounds();
        let first = self.optimizer.minimize(objective, &fitparamset.initials(), &bounds)?;

        let mut status = MinimizerStatus {
            converged: first.converged,
            n_iter: first.n_iter,
            n_fev: first.n_fev,
            n_gev: first.n_gev,
            n_repetitions: 0,
            message: first.message.clone(),
        };
        let mut any_converged = first.converged;
        let mut best: OptimizationResult = first;

        while !any_converged && status.n_repetitions < self.max_repetitions {
            status.n_repetitions += 1;
            log::warn!(
                "minimization did not converge ({}), restart {}/{} from random initial values",
                best.message,
                status.n_repetitions,
                self.max_repetitions
            );
            let init = fitparamset.random_initials(rss.rng());
            let attempt = self.optimizer.minimize(objective, &init, &bounds)?;
            status.n_iter += attempt.n_iter;
            status.n_fev += attempt.n_fev;
            status.n_gev += attempt.n_gev;
            any_converged |= attempt.converged;
            if improves_on(&attempt, &best) {
                best = attempt;
            }
        }

        status.converged = best.converged;
        status.message = best.message.clone();
        Ok(Minimum { x: best.parameters, fmin: best.fval, status })
    }
}

/// Lower minimum first; at equal minimum a converged attempt wins.
fn improves_on(attempt: &OptimizationResult, best: &OptimizationResult) -> bool {
    attempt.fval < best.fval || (attempt.fval == best.fval && attempt.converged && !best.converged)
}
