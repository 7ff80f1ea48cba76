//! Analysis lifecycle: datasets → LLH-ratio construction → trials.
//!
//! [`LlhRatioAnalysis`] carries the lifecycle shared by LLH-ratio analyses (pseudo-data
//! generation, trial execution, unblinding) on top of three required operations:
//! constructing the composite LLH ratio, loading a trial into it and maximizing it.
//! [`TimeIntegratedSingleSourceAnalysis`] is the time-integrated single point-source
//! implementation over any number of datasets.

use crate::background::{BackgroundGenerationMethod, BackgroundGenerator, ScrambledExpDataBkgGenMethod};
use crate::minimizer::{Minimizer, MinimizerStatus};
use crate::optimizer::ObjectiveFunction;
use crate::signal::SignalGenerator;
use crate::test_statistic::{TestStatistic, TestStatisticWilks};
use sky_core::{
    Error, FitParameter, FitParameterSet, RandomStateService, Result, TimeLord, TrialRecord,
    TrialTable, timed,
};
use sky_llh::{
    AllEventSelectionMethod, Dataset, DatasetData, EnergySigOverBkgPdfRatio, EventArray,
    EventSelectionMethod, MultiDatasetLlhRatio, MultiDimPdfRatio, PdfKind, PdfRatio,
    PointLikeSource, SingleSourceDatasetSignalWeights, SingleSourceFitParameterMapper,
    SingleSourceLlhRatio, SourceHypoGroupManager, SpatialSigOverBkgPdfRatio, TrialDataManager,
};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

const TASK_GENERATE: &str = "Generating pseudo data.";
const TASK_INITIALIZE: &str = "Initializing trial.";
const TASK_MAXIMIZE: &str = "Maximizing LLH ratio function.";
const TASK_TS: &str = "Calculating test statistic.";

/// Which PDF-ratio lists a dataset may be attached with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfRatioAttachment {
    /// Any non-empty list.
    #[default]
    Generic,
    /// Exactly one spatial ratio followed by one energy ratio.
    SpatialEnergy,
    /// Exactly one multi-dimensional ratio.
    SingleMultiDim,
}

impl PdfRatioAttachment {
    /// Check a PDF-ratio list against this strategy.
    pub fn validate(&self, pdfratios: &[Arc<dyn PdfRatio>]) -> Result<()> {
        match self {
            Self::Generic => {
                if pdfratios.is_empty() {
                    return Err(Error::Configuration(
                        "a dataset needs at least one PDF ratio".into(),
                    ));
                }
            }
            Self::SpatialEnergy => {
                let kinds: Vec<PdfKind> = pdfratios.iter().map(|r| r.kind()).collect();
                if kinds != [PdfKind::Spatial, PdfKind::Energy] {
                    return Err(Error::Configuration(format!(
                        "spatial-energy analysis needs [Spatial, Energy] PDF ratios, got {kinds:?}"
                    )));
                }
            }
            Self::SingleMultiDim => {
                let kinds: Vec<PdfKind> = pdfratios.iter().map(|r| r.kind()).collect();
                if kinds != [PdfKind::MultiDim] {
                    return Err(Error::Configuration(format!(
                        "single multi-dimensional analysis needs one MultiDim PDF ratio, got {kinds:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Lifecycle state of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    /// No dataset added yet.
    Created,
    /// At least one dataset, no LLH ratio.
    DatasetsAdded,
    /// The composite LLH ratio is constructed; trials can run.
    LlhRatioConstructed,
}

/// Result of [`LlhRatioAnalysis::maximize_llhratio`].
#[derive(Debug, Clone)]
pub struct Maximization {
    /// Fit parameters the maximum was searched over.
    pub fitparamset: FitParameterSet,
    /// `log Λ` at the maximum.
    pub log_lambda_max: f64,
    /// Best-fit values in fit-parameter-set order.
    pub x: Vec<f64>,
    /// Minimizer status.
    pub status: MinimizerStatus,
}

/// Pseudo data of one trial.
#[derive(Debug, Clone)]
pub struct PseudoData {
    /// Number of injected signal events.
    pub n_sig: u64,
    /// Total number of events per dataset.
    pub n_events_list: Vec<u64>,
    /// Events per dataset.
    pub events_list: Vec<EventArray>,
}

/// Outcome of one trial.
#[derive(Debug, Clone)]
pub struct TrialResult {
    /// Result row.
    pub record: TrialRecord,
    /// Minimizer status of the maximization.
    pub status: MinimizerStatus,
}

/// Datasets, source hypothesis and components shared by every analysis.
#[derive(Debug)]
pub struct AnalysisCore {
    shg_mgr: Arc<SourceHypoGroupManager>,
    mapper: Arc<SingleSourceFitParameterMapper>,
    fitparamset: FitParameterSet,
    test_statistic: Arc<dyn TestStatistic>,
    minimizer: Minimizer,
    bkg_gen_method: Arc<dyn BackgroundGenerationMethod>,
    event_selection: Box<dyn EventSelectionMethod>,
    dataset_list: Vec<Dataset>,
    data_list: Vec<Arc<DatasetData>>,
    tdm_list: Vec<TrialDataManager>,
    pdfratio_list: Vec<Vec<Arc<dyn PdfRatio>>>,
    llhratio: Option<MultiDatasetLlhRatio>,
    bkg_generator: OnceLock<BackgroundGenerator>,
    sig_generator: OnceLock<SignalGenerator>,
}

impl AnalysisCore {
    /// Create with the default components: Wilks test statistic, default minimizer,
    /// scrambled-data background and all-event selection.
    ///
    /// The fit-parameter set is `fitparam_ns` followed by the mapper's fit parameters.
    pub fn new(
        shg_mgr: Arc<SourceHypoGroupManager>,
        mapper: SingleSourceFitParameterMapper,
        fitparam_ns: FitParameter,
    ) -> Result<Self> {
        let mut fitparamset = FitParameterSet::new();
        for fp in mapper.fitparams() {
            fitparamset.add(fp.clone(), false)?;
        }
        fitparamset.add(fitparam_ns, true)?;
        Ok(Self {
            shg_mgr,
            mapper: Arc::new(mapper),
            fitparamset,
            test_statistic: Arc::new(TestStatisticWilks),
            minimizer: Minimizer::default(),
            bkg_gen_method: Arc::new(ScrambledExpDataBkgGenMethod::default()),
            event_selection: Box::new(AllEventSelectionMethod),
            dataset_list: Vec::new(),
            data_list: Vec::new(),
            tdm_list: Vec::new(),
            pdfratio_list: Vec::new(),
            llhratio: None,
            bkg_generator: OnceLock::new(),
            sig_generator: OnceLock::new(),
        })
    }

    /// Current source hypothesis.
    pub fn shg_mgr(&self) -> &Arc<SourceHypoGroupManager> {
        &self.shg_mgr
    }

    /// Source fit-parameter mapper.
    pub fn mapper(&self) -> &Arc<SingleSourceFitParameterMapper> {
        &self.mapper
    }

    /// Global fit parameters, `ns` first.
    pub fn fitparamset(&self) -> &FitParameterSet {
        &self.fitparamset
    }

    /// Test-statistic evaluator.
    pub fn test_statistic(&self) -> &Arc<dyn TestStatistic> {
        &self.test_statistic
    }

    /// Minimizer.
    pub fn minimizer(&self) -> &Minimizer {
        &self.minimizer
    }

    /// Event selection method.
    pub fn event_selection(&self) -> &dyn EventSelectionMethod {
        self.event_selection.as_ref()
    }

    /// Datasets in registration order.
    pub fn dataset_list(&self) -> &[Dataset] {
        &self.dataset_list
    }

    /// Loaded data, paired with [`AnalysisCore::dataset_list`].
    pub fn data_list(&self) -> &[Arc<DatasetData>] {
        &self.data_list
    }

    /// Trial data managers, paired with [`AnalysisCore::dataset_list`].
    pub fn tdm_list(&self) -> &[TrialDataManager] {
        &self.tdm_list
    }

    /// PDF-ratio lists, paired with [`AnalysisCore::dataset_list`].
    pub fn pdfratio_list(&self) -> &[Vec<Arc<dyn PdfRatio>>] {
        &self.pdfratio_list
    }

    /// Number of datasets.
    pub fn n_datasets(&self) -> usize {
        self.dataset_list.len()
    }

    fn push_dataset(
        &mut self,
        dataset: Dataset,
        data: Arc<DatasetData>,
        pdfratios: Vec<Arc<dyn PdfRatio>>,
        tdm: TrialDataManager,
    ) {
        if self.llhratio.take().is_some() {
            log::warn!(
                "dataset '{}' added after LLH-ratio construction; the LLH ratio and generators were dropped",
                dataset.name()
            );
        }
        self.bkg_generator = OnceLock::new();
        self.sig_generator = OnceLock::new();
        self.dataset_list.push(dataset);
        self.data_list.push(data);
        self.tdm_list.push(tdm);
        self.pdfratio_list.push(pdfratios);
    }
}

/// Negated composite LLH ratio, minimized to maximize `log Λ`.
struct NegatedLlhRatio<'a> {
    llhratio: &'a MultiDatasetLlhRatio,
}

impl ObjectiveFunction for NegatedLlhRatio<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        Ok(-self.llhratio.evaluate(params)?.0)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(self.llhratio.evaluate(params)?.1.into_iter().map(|g| -g).collect())
    }

    fn eval_grad(&self, params: &[f64]) -> Result<(f64, Vec<f64>)> {
        let (v, g) = self.llhratio.evaluate(params)?;
        Ok((-v, g.into_iter().map(|g| -g).collect()))
    }

    fn prefer_fused_eval_grad(&self) -> bool {
        true
    }
}

/// Minimize the negated `llhratio` over `fitparamset`.
pub(crate) fn maximize_with(
    minimizer: &Minimizer,
    fitparamset: &FitParameterSet,
    llhratio: &MultiDatasetLlhRatio,
    rss: &mut RandomStateService,
) -> Result<Maximization> {
    if !llhratio.is_initialized() {
        return Err(Error::State("LLH ratio maximized before initialize_trial".into()));
    }
    let min = minimizer.minimize(rss, fitparamset, &NegatedLlhRatio { llhratio })?;
    Ok(Maximization {
        fitparamset: fitparamset.clone(),
        log_lambda_max: -min.fmin,
        x: min.x,
        status: min.status,
    })
}

/// LLH-ratio analysis: three required operations plus the trial lifecycle built on them.
pub trait LlhRatioAnalysis: Send + Sync {
    /// Shared datasets and components.
    fn core(&self) -> &AnalysisCore;

    /// Build the composite LLH ratio from the registered datasets.
    fn construct_llhratio(&mut self) -> Result<()>;

    /// Load per-dataset trial events into `llhratio`.
    ///
    /// `n_events_list` gives the total event count per dataset and defaults to the
    /// number of events passed; the difference to the selected count is treated as pure
    /// background.
    fn initialize_trial(
        &self,
        llhratio: &mut MultiDatasetLlhRatio,
        events_list: Vec<EventArray>,
        n_events_list: Option<&[u64]>,
    ) -> Result<()>;

    /// Maximize `llhratio` over the fit parameters.
    fn maximize_llhratio(
        &self,
        llhratio: &MultiDatasetLlhRatio,
        rss: &mut RandomStateService,
    ) -> Result<Maximization>;

    /// Lifecycle state.
    fn state(&self) -> AnalysisState {
        let core = self.core();
        if core.llhratio.is_some() {
            AnalysisState::LlhRatioConstructed
        } else if core.dataset_list.is_empty() {
            AnalysisState::Created
        } else {
            AnalysisState::DatasetsAdded
        }
    }

    /// The constructed composite LLH ratio.
    fn llhratio(&self) -> Result<&MultiDatasetLlhRatio> {
        self.core()
            .llhratio
            .as_ref()
            .ok_or_else(|| Error::State("LLH ratio not constructed; call construct_llhratio".into()))
    }

    /// Test statistic of a maximization result.
    fn calculate_test_statistic(
        &self,
        llhratio: &MultiDatasetLlhRatio,
        log_lambda: f64,
        fitparam_values: &[f64],
    ) -> Result<f64> {
        self.core().test_statistic.evaluate(llhratio, log_lambda, fitparam_values)
    }

    /// Background generator, built on first use.
    fn ensure_background_generator(&self) -> Result<&BackgroundGenerator> {
        let core = self.core();
        if core.bkg_generator.get().is_none() {
            let generator = BackgroundGenerator::new(
                core.bkg_gen_method.clone(),
                core.dataset_list.clone(),
                core.data_list.clone(),
            )?;
            log::debug!("constructed background generator for {} datasets", core.n_datasets());
            let _ = core.bkg_generator.set(generator);
        }
        core.bkg_generator
            .get()
            .ok_or_else(|| Error::State("background generator unavailable".into()))
    }

    /// Signal generator, built on first use.
    fn ensure_signal_generator(&self) -> Result<&SignalGenerator> {
        let core = self.core();
        if core.sig_generator.get().is_none() {
            let generator = SignalGenerator::new(
                core.shg_mgr.clone(),
                core.dataset_list.clone(),
                core.data_list.clone(),
            )?;
            let _ = core.sig_generator.set(generator);
        }
        core.sig_generator
            .get()
            .ok_or_else(|| Error::State("signal generator unavailable".into()))
    }

    /// Draw background for every dataset and, for `sig_mean > 0`, Poisson(`sig_mean`)
    /// signal events appended to their datasets.
    ///
    /// `bkg_mean_list[j] = None` lets the background method decide the mean of dataset `j`.
    fn generate_pseudo_data(
        &self,
        rss: &mut RandomStateService,
        bkg_mean_list: Option<&[Option<f64>]>,
        sig_mean: f64,
    ) -> Result<PseudoData> {
        if !sig_mean.is_finite() || sig_mean < 0.0 {
            return Err(Error::Validation(format!(
                "mean number of signal events must be finite and >= 0, got {sig_mean}"
            )));
        }
        let bkg_gen = self.ensure_background_generator()?;
        let n = bkg_gen.n_datasets();
        if let Some(means) = bkg_mean_list
            && means.len() != n
        {
            return Err(Error::Validation(format!(
                "got {} background means for {n} datasets",
                means.len()
            )));
        }
        if let Some(bad) = bkg_mean_list
            .into_iter()
            .flatten()
            .flatten()
            .find(|m| !m.is_finite() || **m < 0.0)
        {
            return Err(Error::Validation(format!(
                "mean number of background events must be finite and >= 0, got {bad}"
            )));
        }

        let mut n_events_list = Vec::with_capacity(n);
        let mut events_list = Vec::with_capacity(n);
        for j in 0..n {
            let mean = bkg_mean_list.and_then(|m| m[j]);
            let (count, events) = bkg_gen.generate_background_events(rss, j, mean)?;
            n_events_list.push(count);
            events_list.push(events);
        }

        let mut n_sig = 0;
        if sig_mean > 0.0 {
            let sig_gen = self.ensure_signal_generator()?;
            let (count, per_dataset) = sig_gen.generate_signal_events(rss, sig_mean)?;
            n_sig = count;
            for (j, events) in per_dataset {
                events_list[j].append(&events)?;
                n_events_list[j] += events.n_events() as u64;
            }
        }
        Ok(PseudoData { n_sig, n_events_list, events_list })
    }

    /// One trial on a private copy of the LLH ratio.
    fn do_trial(
        &self,
        rss: &mut RandomStateService,
        bkg_mean_list: Option<&[Option<f64>]>,
        sig_mean: f64,
        tl: Option<&TimeLord>,
    ) -> Result<TrialResult> {
        let mut llhratio = self.llhratio()?.clone();
        let pd = timed(tl, TASK_GENERATE, || self.generate_pseudo_data(rss, bkg_mean_list, sig_mean))?;
        timed(tl, TASK_INITIALIZE, || {
            self.initialize_trial(&mut llhratio, pd.events_list, Some(pd.n_events_list.as_slice()))
        })?;
        let max = timed(tl, TASK_MAXIMIZE, || self.maximize_llhratio(&llhratio, rss))?;
        let ts = timed(tl, TASK_TS, || {
            self.calculate_test_statistic(&llhratio, max.log_lambda_max, &max.x)
        })?;
        Ok(TrialResult {
            record: TrialRecord { n_sig: pd.n_sig, ts, fitparam_values: max.x },
            status: max.status,
        })
    }

    /// `n_trials` independent trials on `ncpu` workers; see [`crate::trials::run_trials`].
    fn do_trials(
        &self,
        rss: &mut RandomStateService,
        n_trials: usize,
        bkg_mean_list: Option<&[Option<f64>]>,
        sig_mean: f64,
        ncpu: Option<usize>,
        tl: Option<&TimeLord>,
    ) -> Result<TrialTable> {
        crate::trials::run_trials(self, rss, n_trials, bkg_mean_list, sig_mean, ncpu, tl)
    }

    /// Fit the experimental data. Returns the test statistic, the best-fit values by
    /// fit-parameter name and the minimizer status.
    fn unblind(
        &self,
        rss: &mut RandomStateService,
    ) -> Result<(f64, BTreeMap<String, f64>, MinimizerStatus)> {
        let mut llhratio = self.llhratio()?.clone();
        let events_list = self.core().data_list.iter().map(|d| d.exp().clone()).collect();
        self.initialize_trial(&mut llhratio, events_list, None)?;
        let max = self.maximize_llhratio(&llhratio, rss)?;
        let ts = self.calculate_test_statistic(&llhratio, max.log_lambda_max, &max.x)?;
        let fitparams = max.fitparamset.fitparam_values_to_dict(&max.x)?;
        Ok((ts, fitparams, max.status))
    }
}

/// Time-integrated LLH-ratio analysis of a single point-like source over one or more
/// datasets sharing `ns` through their detector signal yields.
#[derive(Debug)]
pub struct TimeIntegratedSingleSourceAnalysis {
    core: AnalysisCore,
    attachment: PdfRatioAttachment,
}

impl TimeIntegratedSingleSourceAnalysis {
    /// Create for a source hypothesis with exactly one source.
    pub fn new(
        shg_mgr: Arc<SourceHypoGroupManager>,
        mapper: SingleSourceFitParameterMapper,
        fitparam_ns: FitParameter,
        attachment: PdfRatioAttachment,
    ) -> Result<Self> {
        if shg_mgr.n_sources() != 1 {
            return Err(Error::Configuration(format!(
                "single-source analysis needs exactly one source, got {}",
                shg_mgr.n_sources()
            )));
        }
        Ok(Self { core: AnalysisCore::new(shg_mgr, mapper, fitparam_ns)?, attachment })
    }

    /// Replace the minimizer.
    pub fn with_minimizer(mut self, minimizer: Minimizer) -> Self {
        self.core.minimizer = minimizer;
        self
    }

    /// Replace the test statistic.
    pub fn with_test_statistic(mut self, test_statistic: Arc<dyn TestStatistic>) -> Self {
        self.core.test_statistic = test_statistic;
        self
    }

    /// Replace the background generation method.
    pub fn with_bkg_gen_method(mut self, method: Arc<dyn BackgroundGenerationMethod>) -> Self {
        self.core.bkg_gen_method = method;
        self.core.bkg_generator = OnceLock::new();
        self
    }

    /// Replace the event selection method.
    pub fn with_event_selection_method(mut self, method: Box<dyn EventSelectionMethod>) -> Self {
        self.core.event_selection = method;
        self
    }

    /// PDF-ratio attachment strategy.
    pub fn attachment(&self) -> PdfRatioAttachment {
        self.attachment
    }

    /// Register a dataset with its PDF ratios and optional trial data manager.
    ///
    /// The ratios are validated before anything is stored. Adding a dataset after
    /// [`LlhRatioAnalysis::construct_llhratio`] drops the LLH ratio and the generators.
    pub fn add_dataset(
        &mut self,
        dataset: Dataset,
        data: Arc<DatasetData>,
        pdfratios: Vec<Arc<dyn PdfRatio>>,
        tdm: Option<TrialDataManager>,
    ) -> Result<()> {
        self.attachment.validate(&pdfratios)?;
        self.core.push_dataset(dataset, data, pdfratios, tdm.unwrap_or_default());
        Ok(())
    }

    /// Register a dataset with spatial and energy ratios built from its experimental
    /// data with default binnings.
    pub fn add_spatial_energy_dataset(
        &mut self,
        dataset: Dataset,
        data: Arc<DatasetData>,
    ) -> Result<()> {
        let pdfratios: Vec<Arc<dyn PdfRatio>> = vec![
            Arc::new(SpatialSigOverBkgPdfRatio::with_default_binning(data.exp())?),
            Arc::new(EnergySigOverBkgPdfRatio::with_default_binning(data.exp())?),
        ];
        self.add_dataset(dataset, data, pdfratios, None)
    }

    /// Register a dataset with the product of the default spatial and energy ratios as
    /// its single ratio.
    pub fn add_multidim_dataset(&mut self, dataset: Dataset, data: Arc<DatasetData>) -> Result<()> {
        let product = MultiDimPdfRatio::new(vec![
            Arc::new(SpatialSigOverBkgPdfRatio::with_default_binning(data.exp())?),
            Arc::new(EnergySigOverBkgPdfRatio::with_default_binning(data.exp())?),
        ])?;
        self.add_dataset(dataset, data, vec![Arc::new(product)], None)
    }

    /// Move the analysis to a new source position.
    ///
    /// Updates the source hypothesis, the event selection, the LLH ratio and, if already
    /// built, the signal generator.
    pub fn change_source(&mut self, source: PointLikeSource) -> Result<()> {
        if self.core.llhratio.is_none() {
            return Err(Error::State(
                "change_source requires a constructed LLH ratio; call construct_llhratio".into(),
            ));
        }
        let shg_mgr = Arc::new(self.core.shg_mgr.with_source(0, source)?);
        let sig_generator = match self.core.sig_generator.get() {
            Some(g) => Some(g.with_source_hypo_group_manager(shg_mgr.clone())?),
            None => None,
        };
        if let Some(llhratio) = self.core.llhratio.as_mut() {
            llhratio.change_source_hypo_group_manager(shg_mgr.clone())?;
        }
        self.core.event_selection.change_source_hypo_group_manager(shg_mgr.clone());
        if let Some(g) = sig_generator {
            self.core.sig_generator = OnceLock::from(g);
        }
        self.core.shg_mgr = shg_mgr;
        log::debug!("changed source to ra={}, dec={}", source.ra(), source.dec());
        Ok(())
    }
}

impl LlhRatioAnalysis for TimeIntegratedSingleSourceAnalysis {
    fn core(&self) -> &AnalysisCore {
        &self.core
    }

    fn construct_llhratio(&mut self) -> Result<()> {
        let core = &self.core;
        let n = core.n_datasets();
        if n == 0 {
            return Err(Error::State("construct_llhratio called before add_dataset".into()));
        }
        let fluxmodel = core.shg_mgr.get_fluxmodel_by_src_idx(0)?;
        let methods = core.shg_mgr.get_detsigyield_implmethod_list_by_src_idx(0)?;
        if methods.len() != 1 && methods.len() != n {
            return Err(Error::Configuration(format!(
                "{} detector signal yield methods for {n} datasets; need 1 or {n}",
                methods.len()
            )));
        }
        if let Some(m) = methods.iter().find(|m| !m.supports_fluxmodel(fluxmodel.as_ref())) {
            return Err(Error::Configuration(format!(
                "detector signal yield method {m:?} does not support flux model {}",
                fluxmodel.math_function_str()
            )));
        }

        let detsigyields = core
            .dataset_list
            .iter()
            .zip(&core.data_list)
            .enumerate()
            .map(|(j, (ds, data))| {
                let method = if methods.len() == 1 { &methods[0] } else { &methods[j] };
                method.construct_detsigyield(ds, data, fluxmodel.as_ref(), ds.livetime_days())
            })
            .collect::<Result<Vec<_>>>()?;
        let weights = SingleSourceDatasetSignalWeights::new(
            core.shg_mgr.clone(),
            core.mapper.clone(),
            detsigyields,
        )?;

        let source = core.shg_mgr.source(0)?;
        let llhratios = core
            .tdm_list
            .iter()
            .zip(&core.pdfratio_list)
            .map(|(tdm, ratios)| {
                SingleSourceLlhRatio::new(core.mapper.clone(), source, ratios.clone(), tdm.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        let llhratio = MultiDatasetLlhRatio::new(core.mapper.clone(), weights, llhratios)?;
        log::debug!(
            "constructed LLH ratio: {n} datasets, fit parameters {:?}",
            core.fitparamset.names()
        );
        self.core.llhratio = Some(llhratio);
        Ok(())
    }

    fn initialize_trial(
        &self,
        llhratio: &mut MultiDatasetLlhRatio,
        events_list: Vec<EventArray>,
        n_events_list: Option<&[u64]>,
    ) -> Result<()> {
        let n = llhratio.n_datasets();
        if events_list.len() != n {
            return Err(Error::Validation(format!(
                "got {} event arrays for {n} datasets",
                events_list.len()
            )));
        }
        if let Some(counts) = n_events_list
            && counts.len() != n
        {
            return Err(Error::Validation(format!(
                "got {} event counts for {n} datasets",
                counts.len()
            )));
        }

        for (j, events) in events_list.into_iter().enumerate() {
            let n_events = n_events_list.map_or(events.n_events() as u64, |c| c[j]);
            let selected = self.core.event_selection.select_events(&events)?;
            let n_selected = selected.n_events() as u64;
            let n_pure_bkg = n_events.checked_sub(n_selected).ok_or_else(|| {
                Error::Validation(format!(
                    "dataset {j}: {n_selected} selected events exceed the total of {n_events}"
                ))
            })?;
            llhratio.llhratio_mut(j)?.initialize_for_new_trial(selected, n_pure_bkg)?;
        }
        Ok(())
    }

    fn maximize_llhratio(
        &self,
        llhratio: &MultiDatasetLlhRatio,
        rss: &mut RandomStateService,
    ) -> Result<Maximization> {
        maximize_with(&self.core.minimizer, &self.core.fitparamset, llhratio, rss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sky_llh::{
        PowerLawDetSigYieldImplMethod, PowerLawFlux, PointLikeSourceSignalGenerationMethod,
        SourceHypoGroup,
    };

    fn shg_mgr() -> Arc<SourceHypoGroupManager> {
        let group = SourceHypoGroup::new(
            vec![PointLikeSource::new(1.0, 0.2).unwrap()],
            Arc::new(PowerLawFlux::new(1.0, 1e3, 2.0).unwrap()),
            vec![Arc::new(PowerLawDetSigYieldImplMethod::default())],
            Some(Arc::new(PointLikeSourceSignalGenerationMethod::default())),
        )
        .unwrap();
        Arc::new(SourceHypoGroupManager::single(group))
    }

    fn analysis(attachment: PdfRatioAttachment) -> TimeIntegratedSingleSourceAnalysis {
        let mut mapper = SingleSourceFitParameterMapper::new();
        mapper
            .def_fit_parameter(FitParameter::new("gamma", 1.0, 4.0, 2.0).unwrap(), "gamma")
            .unwrap();
        TimeIntegratedSingleSourceAnalysis::new(
            shg_mgr(),
            mapper,
            FitParameter::new("ns", 0.0, 100.0, 10.0).unwrap(),
            attachment,
        )
        .unwrap()
    }

    #[test]
    fn test_fitparamset_has_ns_first() {
        let a = analysis(PdfRatioAttachment::Generic);
        assert_eq!(a.core().fitparamset().names(), vec!["ns".to_string(), "gamma".to_string()]);
        assert_eq!(a.state(), AnalysisState::Created);
    }

    #[test]
    fn test_change_source_before_construction_is_state_error() {
        let mut a = analysis(PdfRatioAttachment::Generic);
        let err = a.change_source(PointLikeSource::new(0.5, 0.1).unwrap()).unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn test_llhratio_before_construction_is_state_error() {
        let a = analysis(PdfRatioAttachment::Generic);
        assert!(matches!(a.llhratio().unwrap_err(), Error::State(_)));
    }

    #[test]
    fn test_construct_without_datasets_is_state_error() {
        let mut a = analysis(PdfRatioAttachment::Generic);
        assert!(matches!(a.construct_llhratio().unwrap_err(), Error::State(_)));
    }

    #[test]
    fn test_two_sources_rejected() {
        let src = PointLikeSource::new(1.0, 0.2).unwrap();
        let group = SourceHypoGroup::new(
            vec![src, src],
            Arc::new(PowerLawFlux::new(1.0, 1e3, 2.0).unwrap()),
            vec![Arc::new(PowerLawDetSigYieldImplMethod::default())],
            None,
        )
        .unwrap();
        let err = TimeIntegratedSingleSourceAnalysis::new(
            Arc::new(SourceHypoGroupManager::single(group)),
            SingleSourceFitParameterMapper::new(),
            FitParameter::new("ns", 0.0, 100.0, 10.0).unwrap(),
            PdfRatioAttachment::Generic,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_generic_attachment_rejects_empty_list() {
        assert!(matches!(
            PdfRatioAttachment::Generic.validate(&[]).unwrap_err(),
            Error::Configuration(_)
        ));
        assert!(matches!(
            PdfRatioAttachment::SingleMultiDim.validate(&[]).unwrap_err(),
            Error::Configuration(_)
        ));
    }
}
