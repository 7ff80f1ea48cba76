//! Log-likelihood-ratio functions: per dataset and combined over datasets.
//!
//! For one dataset with `N = n_selected + n_pure_bkg` trial events, per-event PDF
//! ratios `R_i` and signal count `ns`:
//!
//! ```text
//! X_i     = (R_i - 1) / N
//! log Λ   = Σ_i ln(1 + ns X_i) + n_pure_bkg ln(1 - ns / N)
//! ```
//!
//! `ln(1 + α)` is continued by a second-order Taylor expansion below `α = -1 + 1e-3`.
//! Datasets share `ns` through the weights `f_j = Y_j / Σ_k Y_k` of their detector
//! signal yields.

use crate::detsigyield::DetSigYield;
use crate::event_store::EventArray;
use crate::math::log1p_continued;
use crate::pdfratio::PdfRatio;
use crate::source::{
    PointLikeSource, SingleSourceFitParameterMapper, SourceHypoGroupManager, SourceParams,
};
use crate::trialdata::TrialDataManager;
use sky_core::{Error, Result};
use std::sync::Arc;

/// Value of a single-dataset LLH ratio and its derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct LlhRatioValue {
    /// `log Λ`.
    pub value: f64,
    /// `∂ log Λ / ∂ ns`.
    pub grad_ns: f64,
    /// `∂ log Λ / ∂ p` for every source fit parameter of the mapper, at fixed `ns`.
    pub grad_params: Vec<f64>,
}

/// LLH ratio of one dataset for a single source.
///
/// Cloning is cheap apart from the current trial's events; each trial works on its own
/// clone.
#[derive(Debug, Clone)]
pub struct SingleSourceLlhRatio {
    mapper: Arc<SingleSourceFitParameterMapper>,
    source: PointLikeSource,
    pdfratios: Vec<Arc<dyn PdfRatio>>,
    tdm: TrialDataManager,
    /// Product of the parameter-independent ratios for the current trial.
    const_ratio: Vec<f64>,
}

impl SingleSourceLlhRatio {
    /// Create the LLH ratio of one dataset.
    ///
    /// Every source parameter a PDF ratio depends on must be mapped by `mapper`, and the
    /// trial data manager is extended with the derived fields the ratios read.
    pub fn new(
        mapper: Arc<SingleSourceFitParameterMapper>,
        source: PointLikeSource,
        pdfratios: Vec<Arc<dyn PdfRatio>>,
        mut tdm: TrialDataManager,
    ) -> Result<Self> {
        if pdfratios.is_empty() {
            return Err(Error::Validation("LLH ratio requires at least one PDF ratio".into()));
        }
        let mapped = mapper.src_param_names();
        for r in &pdfratios {
            if let Some(p) = r.param_names().iter().find(|p| !mapped.contains(&p.as_str())) {
                return Err(Error::Configuration(format!(
                    "PDF ratio {:?} depends on source parameter '{p}', which no fit parameter maps to",
                    r.kind()
                )));
            }
            tdm.ensure_fields(&r.required_fields())?;
        }
        Ok(Self { mapper, source, pdfratios, tdm, const_ratio: Vec::new() })
    }

    /// Trial data of the current trial.
    pub fn tdm(&self) -> &TrialDataManager {
        &self.tdm
    }

    /// PDF ratios in evaluation order.
    pub fn pdfratios(&self) -> &[Arc<dyn PdfRatio>] {
        &self.pdfratios
    }

    /// Current source.
    pub fn source(&self) -> &PointLikeSource {
        &self.source
    }

    /// Whether a trial has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.tdm.is_initialized()
    }

    /// Load the selected events of a new trial and the number of pure background events.
    pub fn initialize_for_new_trial(
        &mut self,
        events: EventArray,
        n_pure_bkg_events: u64,
    ) -> Result<()> {
        self.tdm.initialize_trial(events, n_pure_bkg_events)?;
        self.update_const_ratio()
    }

    /// Move to a new source position.
    pub fn change_source(&mut self, source: PointLikeSource) -> Result<()> {
        self.source = source;
        if self.is_initialized() { self.update_const_ratio() } else { Ok(()) }
    }

    fn update_const_ratio(&mut self) -> Result<()> {
        let events = self.tdm.events();
        let n = events.n_events();
        let mut prod = vec![1.0; n];
        let mut buf = vec![0.0; n];
        let empty = SourceParams::new();
        for r in self.pdfratios.iter().filter(|r| r.param_names().is_empty()) {
            r.evaluate(events, &self.source, &empty, &mut buf)?;
            for (p, v) in prod.iter_mut().zip(&buf) {
                *p *= v;
            }
        }
        self.const_ratio = prod;
        Ok(())
    }

    /// Evaluate at `fitparam_values = [ns, p_1, ..]`.
    pub fn evaluate(&self, fitparam_values: &[f64]) -> Result<(f64, Vec<f64>)> {
        let Some((&ns, rest)) = fitparam_values.split_first() else {
            return Err(Error::Validation("fit parameter values must start with ns".into()));
        };
        let v = self.evaluate_with_ns(ns, &self.mapper.src_params(rest)?)?;
        let mut grad = Vec::with_capacity(1 + v.grad_params.len());
        grad.push(v.grad_ns);
        grad.extend(v.grad_params);
        Ok((v.value, grad))
    }

    /// Evaluate for signal count `ns` and named source parameters.
    pub fn evaluate_with_ns(&self, ns: f64, src_params: &SourceParams) -> Result<LlhRatioValue> {
        if !self.is_initialized() {
            return Err(Error::State("LLH ratio evaluated before initialize_for_new_trial".into()));
        }
        let n_params = self.mapper.n_fitparams();
        let n_total = self.tdm.n_events() as f64;
        if n_total == 0.0 {
            return Ok(LlhRatioValue { value: 0.0, grad_ns: 0.0, grad_params: vec![0.0; n_params] });
        }

        let events = self.tdm.events();
        let n_sel = events.n_events();
        let dependent: Vec<&Arc<dyn PdfRatio>> =
            self.pdfratios.iter().filter(|r| !r.param_names().is_empty()).collect();
        let values = dependent
            .iter()
            .map(|r| {
                let mut v = vec![0.0; n_sel];
                r.evaluate(events, &self.source, src_params, &mut v)?;
                Ok(v)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ratio = self.const_ratio.clone();
        for v in &values {
            for (r, x) in ratio.iter_mut().zip(v) {
                *r *= x;
            }
        }

        // dR/dp for every mapped parameter some ratio depends on.
        let mut dratio: Vec<Option<Vec<f64>>> = vec![None; n_params];
        for (m, name) in self.mapper.src_param_names().into_iter().enumerate() {
            let mut acc: Option<Vec<f64>> = None;
            for (k, r) in dependent.iter().enumerate() {
                if !r.depends_on(name) {
                    continue;
                }
                let mut term = vec![0.0; n_sel];
                r.gradient(events, &self.source, src_params, name, &mut term)?;
                for (i, t) in term.iter_mut().enumerate() {
                    *t *= self.const_ratio[i];
                }
                for (l, v) in values.iter().enumerate() {
                    if l != k {
                        for (t, x) in term.iter_mut().zip(v) {
                            *t *= x;
                        }
                    }
                }
                match acc.as_mut() {
                    Some(a) => a.iter_mut().zip(&term).for_each(|(a, t)| *a += t),
                    None => acc = Some(term),
                }
            }
            dratio[m] = acc;
        }

        let mut value = 0.0;
        let mut grad_ns = 0.0;
        let mut grad_params = vec![0.0; n_params];
        for (i, &r) in ratio.iter().enumerate() {
            let x = (r - 1.0) / n_total;
            let (ln, d) = log1p_continued(ns * x);
            value += ln;
            grad_ns += d * x;
            for (g, dr) in grad_params.iter_mut().zip(&dratio) {
                if let Some(dr) = dr {
                    *g += d * ns * dr[i] / n_total;
                }
            }
        }

        let n_pure = self.tdm.n_pure_bkg_events() as f64;
        if n_pure > 0.0 {
            let (ln, d) = log1p_continued(-ns / n_total);
            value += n_pure * ln;
            grad_ns -= n_pure * d / n_total;
        }

        if !value.is_finite() || !grad_ns.is_finite() || grad_params.iter().any(|g| !g.is_finite())
        {
            return Err(Error::Computation(format!(
                "non-finite log-likelihood ratio {value} at ns={ns}"
            )));
        }
        Ok(LlhRatioValue { value, grad_ns, grad_params })
    }
}

/// Relative signal weights `f_j = Y_j / Σ_k Y_k` of the datasets for a single source.
#[derive(Debug, Clone)]
pub struct SingleSourceDatasetSignalWeights {
    shg_mgr: Arc<SourceHypoGroupManager>,
    mapper: Arc<SingleSourceFitParameterMapper>,
    detsigyields: Vec<Arc<dyn DetSigYield>>,
}

/// Dataset weights and their derivatives w.r.t. the source fit parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetWeights {
    /// `f_j` per dataset.
    pub f: Vec<f64>,
    /// `∂f_j/∂p_m`, indexed `[dataset][mapper fit parameter]`.
    pub grads: Vec<Vec<f64>>,
}

impl SingleSourceDatasetSignalWeights {
    /// One detector signal yield per dataset.
    pub fn new(
        shg_mgr: Arc<SourceHypoGroupManager>,
        mapper: Arc<SingleSourceFitParameterMapper>,
        detsigyields: Vec<Arc<dyn DetSigYield>>,
    ) -> Result<Self> {
        if detsigyields.is_empty() {
            return Err(Error::Validation("dataset signal weights need at least one yield".into()));
        }
        shg_mgr.source(0)?;
        Ok(Self { shg_mgr, mapper, detsigyields })
    }

    /// Number of datasets.
    pub fn n_datasets(&self) -> usize {
        self.detsigyields.len()
    }

    /// Detector signal yields in dataset order.
    pub fn detsigyields(&self) -> &[Arc<dyn DetSigYield>] {
        &self.detsigyields
    }

    /// Follow a new source hypothesis.
    pub fn change_source_hypo_group_manager(&mut self, shg_mgr: Arc<SourceHypoGroupManager>) {
        self.shg_mgr = shg_mgr;
    }

    /// Weights at the current source and the given source parameters.
    pub fn compute(&self, src_params: &SourceParams) -> Result<DatasetWeights> {
        let source = self.shg_mgr.source(0)?;
        let n_params = self.mapper.n_fitparams();
        let src_names = self.mapper.src_param_names();

        let mut y = Vec::with_capacity(self.detsigyields.len());
        let mut dy = Vec::with_capacity(self.detsigyields.len());
        for dsy in &self.detsigyields {
            let (v, g) = dsy.value_and_grad(&source, src_params)?;
            let mut mapped = vec![0.0; n_params];
            for (m, name) in src_names.iter().enumerate() {
                if let Some(k) = dsy.param_names().iter().position(|p| p == name) {
                    mapped[m] = g[k];
                }
            }
            y.push(v);
            dy.push(mapped);
        }

        let total: f64 = y.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(Error::Computation(format!(
                "total detector signal yield is {total} at source dec={}",
                source.dec()
            )));
        }
        let dtotal: Vec<f64> =
            (0..n_params).map(|m| dy.iter().map(|d| d[m]).sum()).collect();

        let f = y.iter().map(|v| v / total).collect();
        let grads = y
            .iter()
            .zip(&dy)
            .map(|(&yj, dyj)| {
                (0..n_params)
                    .map(|m| (dyj[m] * total - yj * dtotal[m]) / (total * total))
                    .collect()
            })
            .collect();
        Ok(DatasetWeights { f, grads })
    }
}

/// Sum of per-dataset LLH ratios sharing one `ns` through the dataset signal weights.
#[derive(Debug, Clone)]
pub struct MultiDatasetLlhRatio {
    mapper: Arc<SingleSourceFitParameterMapper>,
    weights: SingleSourceDatasetSignalWeights,
    llhratios: Vec<SingleSourceLlhRatio>,
}

impl MultiDatasetLlhRatio {
    /// Combine one LLH ratio per dataset.
    pub fn new(
        mapper: Arc<SingleSourceFitParameterMapper>,
        weights: SingleSourceDatasetSignalWeights,
        llhratios: Vec<SingleSourceLlhRatio>,
    ) -> Result<Self> {
        if llhratios.len() != weights.n_datasets() {
            return Err(Error::Validation(format!(
                "{} LLH ratios but {} dataset signal weights",
                llhratios.len(),
                weights.n_datasets()
            )));
        }
        Ok(Self { mapper, weights, llhratios })
    }

    /// Number of datasets.
    pub fn n_datasets(&self) -> usize {
        self.llhratios.len()
    }

    /// Number of fit parameters, `ns` included.
    pub fn n_fitparams(&self) -> usize {
        1 + self.mapper.n_fitparams()
    }

    /// Per-dataset LLH ratios.
    pub fn llhratios(&self) -> &[SingleSourceLlhRatio] {
        &self.llhratios
    }

    /// Per-dataset LLH ratio `j`.
    pub fn llhratio_mut(&mut self, j: usize) -> Result<&mut SingleSourceLlhRatio> {
        let n = self.llhratios.len();
        self.llhratios
            .get_mut(j)
            .ok_or_else(|| Error::Validation(format!("dataset index {j} out of range for {n}")))
    }

    /// Dataset signal weights.
    pub fn dataset_signal_weights(&self) -> &SingleSourceDatasetSignalWeights {
        &self.weights
    }

    /// Whether every dataset has a trial loaded.
    pub fn is_initialized(&self) -> bool {
        self.llhratios.iter().all(|l| l.is_initialized())
    }

    /// Follow a new source hypothesis in every dataset.
    pub fn change_source_hypo_group_manager(
        &mut self,
        shg_mgr: Arc<SourceHypoGroupManager>,
    ) -> Result<()> {
        let source = shg_mgr.source(0)?;
        for l in &mut self.llhratios {
            l.change_source(source)?;
        }
        self.weights.change_source_hypo_group_manager(shg_mgr);
        Ok(())
    }

    /// `Σ_j log Λ_j(ns f_j, p)` and its gradient at `[ns, p_1, ..]`.
    pub fn evaluate(&self, fitparam_values: &[f64]) -> Result<(f64, Vec<f64>)> {
        if fitparam_values.len() != self.n_fitparams() {
            return Err(Error::Validation(format!(
                "expected {} fit parameter values, got {}",
                self.n_fitparams(),
                fitparam_values.len()
            )));
        }
        if !self.is_initialized() {
            return Err(Error::State("LLH ratio evaluated before initialize_trial".into()));
        }
        let ns = fitparam_values[0];
        let src_params = self.mapper.src_params(&fitparam_values[1..])?;
        let w = self.weights.compute(&src_params)?;

        let mut value = 0.0;
        let mut grad = vec![0.0; self.n_fitparams()];
        for (j, llh) in self.llhratios.iter().enumerate() {
            let v = llh.evaluate_with_ns(ns * w.f[j], &src_params)?;
            value += v.value;
            grad[0] += v.grad_ns * w.f[j];
            for (m, gp) in v.grad_params.iter().enumerate() {
                grad[1 + m] += v.grad_ns * ns * w.grads[j][m] + gp;
            }
        }
        Ok((value, grad))
    }
}
