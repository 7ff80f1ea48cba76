//! Test statistics computed from the maximized log-likelihood ratio.

use sky_core::{Error, Result};
use sky_llh::MultiDatasetLlhRatio;
use std::fmt;

/// Reduces `log Λ` at its maximum to a test-statistic value.
pub trait TestStatistic: Send + Sync + fmt::Debug {
    /// Test statistic for the best-fit values `[ns, p_1, ..]`.
    fn evaluate(
        &self,
        llhratio: &MultiDatasetLlhRatio,
        log_lambda: f64,
        fitparam_values: &[f64],
    ) -> Result<f64>;
}

/// `TS = 2 sign(ns) log Λ`, with `sign(0) = 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestStatisticWilks;

impl TestStatistic for TestStatisticWilks {
    fn evaluate(
        &self,
        _llhratio: &MultiDatasetLlhRatio,
        log_lambda: f64,
        fitparam_values: &[f64],
    ) -> Result<f64> {
        let ns = *fitparam_values
            .first()
            .ok_or_else(|| Error::Validation("fit parameter values must start with ns".into()))?;
        Ok(wilks_ts(ns, log_lambda))
    }
}

/// `2 sign(ns) log Λ` with `sign(0) = 0`.
pub fn wilks_ts(ns: f64, log_lambda: f64) -> f64 {
    let sign = if ns > 0.0 {
        1.0
    } else if ns < 0.0 {
        -1.0
    } else {
        0.0
    };
    2.0 * sign * log_lambda
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wilks_sign_convention() {
        assert_eq!(wilks_ts(3.0, 1.5), 3.0);
        assert_eq!(wilks_ts(0.0, 1.5), 0.0);
        assert_eq!(wilks_ts(-1.0, 0.5), -1.0);
    }
}
