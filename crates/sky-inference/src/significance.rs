//! p-values and Gaussian significances of test-statistic values.

use sky_core::{Error, Result, TrialTable};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Fraction of background trials with `TS >= ts`, with add-one smoothing:
/// `(k + 1) / (n + 1)`.
pub fn empirical_pvalue(ts: f64, bkg_trials: &TrialTable) -> Result<f64> {
    if ts.is_nan() {
        return Err(Error::Validation("test statistic is NaN".into()));
    }
    let k = bkg_trials.records().iter().filter(|r| r.ts >= ts).count();
    Ok((k + 1) as f64 / (bkg_trials.len() + 1) as f64)
}

/// p-value of `ts` under a half chi-square distribution with one degree of freedom.
///
/// Non-positive `ts` gives 1.
pub fn wilks_half_chi2_pvalue(ts: f64) -> Result<f64> {
    if ts.is_nan() {
        return Err(Error::Validation("test statistic is NaN".into()));
    }
    if ts <= 0.0 {
        return Ok(1.0);
    }
    let chi2 = ChiSquared::new(1.0)
        .map_err(|e| Error::Computation(format!("chi-square distribution: {e}")))?;
    Ok(0.5 * chi2.sf(ts))
}

/// One-sided Gaussian significance of a p-value in `(0, 1]`.
pub fn pvalue_to_sigma(p: f64) -> Result<f64> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(Error::Validation(format!("p-value must be in (0, 1], got {p}")));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| Error::Computation(format!("normal distribution: {e}")))?;
    Ok(-normal.inverse_cdf(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sky_core::TrialRecord;

    fn table(ts: &[f64]) -> TrialTable {
        let mut t = TrialTable::new(vec!["ns".into()]);
        for &v in ts {
            t.push(TrialRecord { n_sig: 0, ts: v, fitparam_values: vec![0.0] }).unwrap();
        }
        t
    }

    #[test]
    fn test_empirical_pvalue_add_one() {
        let t = table(&[0.0, 0.0, 1.0, 4.0]);
        assert_relative_eq!(empirical_pvalue(2.0, &t).unwrap(), 2.0 / 5.0);
        assert_relative_eq!(empirical_pvalue(10.0, &t).unwrap(), 1.0 / 5.0);
        assert_relative_eq!(empirical_pvalue(0.0, &t).unwrap(), 1.0);
        assert_relative_eq!(empirical_pvalue(1.0, &table(&[])).unwrap(), 1.0);
    }

    #[test]
    fn test_wilks_pvalue_matches_gaussian_tail() {
        // TS = 9 is 3 sigma under Wilks.
        let p = wilks_half_chi2_pvalue(9.0).unwrap();
        assert_relative_eq!(p, 1.349_898e-3, max_relative = 1e-5);
        assert_relative_eq!(pvalue_to_sigma(p).unwrap(), 3.0, epsilon = 1e-6);
        assert_eq!(wilks_half_chi2_pvalue(-1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_sigma_of_half_is_zero() {
        assert_relative_eq!(pvalue_to_sigma(0.5).unwrap(), 0.0, epsilon = 1e-9);
        assert!(pvalue_to_sigma(0.0).is_err());
        assert!(pvalue_to_sigma(1.5).is_err());
    }
}
