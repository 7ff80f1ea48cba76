//! Signal pseudo-event generation across datasets.

use crate::sampling::poisson_count;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use sky_core::{Error, RandomStateService, Result};
use sky_llh::{Dataset, DatasetData, EventArray, SourceHypoGroupManager};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One weighted (dataset, group, MC event, source) injection candidate.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    ds_idx: usize,
    group_idx: usize,
    mc_idx: usize,
    local_src_idx: usize,
}

/// Injects signal events for the sources of a source hypothesis group manager.
///
/// Candidates of all datasets and groups form one weighted pool, so signal events are
/// distributed over datasets in proportion to their expected signal counts.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    shg_mgr: Arc<SourceHypoGroupManager>,
    dataset_list: Vec<Dataset>,
    data_list: Vec<Arc<DatasetData>>,
    candidates: Vec<Candidate>,
    sampler: WeightedIndex<f64>,
    total_weight: f64,
}

impl SignalGenerator {
    /// Build the candidate pool.
    ///
    /// Every group needs a signal-generation method and the pool must have positive
    /// total weight.
    pub fn new(
        shg_mgr: Arc<SourceHypoGroupManager>,
        dataset_list: Vec<Dataset>,
        data_list: Vec<Arc<DatasetData>>,
    ) -> Result<Self> {
        if dataset_list.len() != data_list.len() {
            return Err(Error::Validation(format!(
                "{} datasets but {} data entries",
                dataset_list.len(),
                data_list.len()
            )));
        }
        for (ds, data) in dataset_list.iter().zip(&data_list) {
            data.mc().require_columns(data.exp().column_names()).map_err(|e| {
                Error::Configuration(format!(
                    "dataset '{}' MC cannot provide the experimental columns: {e}",
                    ds.name()
                ))
            })?;
        }

        let mut candidates = Vec::new();
        let mut weights = Vec::new();
        for (group_idx, group) in shg_mgr.groups().iter().enumerate() {
            let method = group.sig_gen_method().ok_or_else(|| {
                Error::Configuration(format!(
                    "source hypothesis group {group_idx} has no signal generation method"
                ))
            })?;
            for (ds_idx, (ds, data)) in dataset_list.iter().zip(&data_list).enumerate() {
                let c = method.signal_candidates(
                    data.mc(),
                    group.sources(),
                    group.fluxmodel().as_ref(),
                    ds.livetime_days(),
                )?;
                for k in 0..c.len() {
                    candidates.push(Candidate {
                        ds_idx,
                        group_idx,
                        mc_idx: c.mc_indices[k],
                        local_src_idx: c.src_indices[k],
                    });
                    weights.push(c.weights[k]);
                }
            }
        }

        let total_weight: f64 = weights.iter().sum();
        if candidates.is_empty() || !total_weight.is_finite() || total_weight <= 0.0 {
            return Err(Error::Computation(format!(
                "no signal candidates with positive weight ({} candidates, total weight {total_weight})",
                candidates.len()
            )));
        }
        let sampler = WeightedIndex::new(&weights)
            .map_err(|e| Error::Computation(format!("invalid signal candidate weights: {e}")))?;

        log::debug!(
            "constructed signal generator: {} candidates, expected signal count {total_weight:.4}",
            candidates.len()
        );
        Ok(Self { shg_mgr, dataset_list, data_list, candidates, sampler, total_weight })
    }

    /// Copy rebuilt for a new source hypothesis.
    pub fn with_source_hypo_group_manager(
        &self,
        shg_mgr: Arc<SourceHypoGroupManager>,
    ) -> Result<Self> {
        Self::new(shg_mgr, self.dataset_list.clone(), self.data_list.clone())
    }

    /// Source hypothesis the generator injects for.
    pub fn source_hypo_group_manager(&self) -> &Arc<SourceHypoGroupManager> {
        &self.shg_mgr
    }

    /// Expected number of detected signal events for the configured flux.
    pub fn expected_signal_count(&self) -> f64 {
        self.total_weight
    }

    /// Draw `Poisson(mean)` signal events.
    ///
    /// Returns the number of injected events and the events per dataset index, with
    /// the experimental columns of that dataset.
    pub fn generate_signal_events(
        &self,
        rss: &mut RandomStateService,
        mean: f64,
    ) -> Result<(u64, BTreeMap<usize, EventArray>)> {
        let n_sig = poisson_count(rss.rng(), mean)?;

        let mut drawn: BTreeMap<(usize, usize), (Vec<usize>, Vec<usize>)> = BTreeMap::new();
        for _ in 0..n_sig {
            let c = self.candidates[self.sampler.sample(rss.rng())];
            let entry = drawn.entry((c.ds_idx, c.group_idx)).or_default();
            entry.0.push(c.mc_idx);
            entry.1.push(c.local_src_idx);
        }

        let mut out: BTreeMap<usize, EventArray> = BTreeMap::new();
        for ((ds_idx, group_idx), (mc_idx, src_idx)) in drawn {
            let data = &self.data_list[ds_idx];
            let group = &self.shg_mgr.groups()[group_idx];
            let method = group.sig_gen_method().ok_or_else(|| {
                Error::Configuration(format!(
                    "source hypothesis group {group_idx} has no signal generation method"
                ))
            })?;
            let rows = data.mc().select(&mc_idx)?;
            let events = method
                .post_process(rows, group.sources(), &src_idx)?
                .project(data.exp().column_names())?;
            match out.get_mut(&ds_idx) {
                Some(existing) => existing.append(&events)?,
                None => {
                    out.insert(ds_idx, events);
                }
            }
        }
        Ok((n_sig, out))
    }
}
