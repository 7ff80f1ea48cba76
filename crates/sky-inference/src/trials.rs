//! Parallel execution of independent trials.

use crate::analysis::LlhRatioAnalysis;
use rayon::prelude::*;
use sky_core::{Error, RandomStateService, Result, TimeLord, TrialTable};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Worker count used when a batch does not specify one; `0` means Rayon's default.
static DEFAULT_NCPU: AtomicUsize = AtomicUsize::new(0);

/// Set the process-wide default worker count.
pub fn set_default_ncpu(ncpu: usize) {
    DEFAULT_NCPU.store(ncpu, Ordering::Relaxed);
}

/// Worker count for a batch: `ncpu` if given, else the process-wide default.
pub fn get_ncpu(ncpu: Option<usize>) -> usize {
    ncpu.unwrap_or_else(|| DEFAULT_NCPU.load(Ordering::Relaxed))
}

/// Run `n_trials` trials of `analysis`.
///
/// Trial `i` draws from substream `i` of one base draw of `rss`, so the table depends
/// only on the state of `rss`, never on the worker count. Each trial works on its own
/// copy of the LLH ratio. The error of the lowest-index failing trial is returned;
/// non-converged maximizations are counted in [`TrialTable::n_nonconverged`].
pub fn run_trials<A: LlhRatioAnalysis + ?Sized>(
    analysis: &A,
    rss: &mut RandomStateService,
    n_trials: usize,
    bkg_mean_list: Option<&[Option<f64>]>,
    sig_mean: f64,
    ncpu: Option<usize>,
    tl: Option<&TimeLord>,
) -> Result<TrialTable> {
    let mut table = TrialTable::new(analysis.core().fitparamset().names());
    if n_trials == 0 {
        return Ok(table);
    }

    analysis.llhratio()?;
    analysis.ensure_background_generator()?;
    if sig_mean > 0.0 {
        analysis.ensure_signal_generator()?;
    }

    let streams = rss.derive_substreams(n_trials);
    log::debug!("running {n_trials} trials (sig_mean={sig_mean})");
    let results = run_indexed(streams, ncpu, |_, s| analysis.do_trial(s, bkg_mean_list, sig_mean, tl))?;

    for (i, result) in results.into_iter().enumerate() {
        if !result.status.converged {
            table.n_nonconverged += 1;
            log::warn!("trial {i}: maximization did not converge: {}", result.status);
        }
        table.push(result.record)?;
    }
    Ok(table)
}

/// Run `trial` once per substream, on `get_ncpu(ncpu)` workers, keeping substream order.
///
/// Every trial runs to completion; the error of the lowest failing index is returned.
pub(crate) fn run_indexed<T, F>(
    streams: Vec<RandomStateService>,
    ncpu: Option<usize>,
    trial: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, &mut RandomStateService) -> Result<T> + Sync,
{
    let ncpu = get_ncpu(ncpu);
    let run = || -> Vec<Result<T>> {
        streams
            .into_par_iter()
            .enumerate()
            .map(|(i, mut s)| trial(i, &mut s))
            .collect()
    };
    let results = if ncpu > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ncpu)
            .build()
            .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
        pool.install(run)
    } else {
        run()
    };

    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.inspect_err(|e| log::debug!("trial {i} failed: {e}")))
        .collect()
}
#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    use crate::config::AnalysisConfig;

    fn streams(n: usize) -> Vec<RandomStateService> {
        RandomStateService::from_seed(5).derive_substreams(n)
    }

    #[test]
    fn test_lowest_index_error_wins() {
        for ncpu in [1, 4] {
            let err = run_indexed(streams(10), Some(ncpu), |i, _| {
                if i == 3 || i == 7 {
                    Err(Error::Computation(format!("trial {i} broke")))
                } else {
                    Ok(i)
                }
            })
            .unwrap_err();
            assert_eq!(err.to_string(), Error::Computation("trial 3 broke".into()).to_string());
        }
    }

    #[test]
    fn test_results_keep_substream_order() {
        let out = run_indexed(streams(16), Some(4), |i, s| Ok((i, s.rng().random::<u64>()))).unwrap();
        let serial = run_indexed(streams(16), Some(1), |i, s| Ok((i, s.rng().random::<u64>()))).unwrap();
        assert_eq!(out, serial);
        assert!(out.iter().enumerate().all(|(k, (i, _))| k == *i));
    }

    // The only test in this binary that touches the process-wide default.
    #[test]
    fn test_default_ncpu_feeds_unspecified_batches() {
        let workers = |ncpu| run_indexed(streams(8), ncpu, |_, _| Ok(rayon::current_num_threads())).unwrap();

        set_default_ncpu(3);
        assert_eq!(get_ncpu(None), 3);
        assert!(workers(None).iter().all(|&n| n == 3));
        assert!(workers(Some(2)).iter().all(|&n| n == 2));

        AnalysisConfig::from_json_str(r#"{"trials": {"ncpu": 2}}"#).unwrap().apply_global();
        assert!(workers(None).iter().all(|&n| n == 2));
        assert_eq!(get_ncpu(Some(5)), 5);

        set_default_ncpu(0);
    }
}
