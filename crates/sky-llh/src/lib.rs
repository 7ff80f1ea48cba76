//! # sky-llh
//!
//! Event-level log-likelihood-ratio functions for point-source searches.
//!
//! This crate provides:
//! - A columnar [`EventArray`] (SoA layout) and dataset descriptions.
//! - Source hypotheses, flux models and detector signal yields.
//! - Signal-over-background PDF ratios and event selection.
//! - Per-dataset and multi-dataset LLH-ratio functions with analytic gradients, the
//!   objective maximized by `sky-inference`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binning;
pub mod dataset;
pub mod detsigyield;
pub mod event_selection;
pub mod event_store;
pub mod flux;
pub mod llhratio;
pub mod math;
pub mod pdfratio;
pub mod signal_generation;
pub mod source;
pub mod trialdata;

pub use binning::Binning;
pub use dataset::{Dataset, DatasetData, EXP_FIELDS, MC_FIELDS};
pub use detsigyield::{
    DetSigYield, DetSigYieldImplMethod, PowerLawDetSigYield, PowerLawDetSigYieldImplMethod,
};
pub use event_selection::{
    AllEventSelectionMethod, DecBandEventSelectionMethod, EventSelectionMethod,
};
pub use event_store::EventArray;
pub use flux::{CutoffPowerLawFlux, FluxModel, LogParabolaPowerLawFlux, PowerLawFlux};
pub use llhratio::{
    DatasetWeights, LlhRatioValue, MultiDatasetLlhRatio, SingleSourceDatasetSignalWeights,
    SingleSourceLlhRatio,
};
pub use pdfratio::{
    EnergySigOverBkgPdfRatio, MultiDimPdfRatio, PdfKind, PdfRatio, SpatialSigOverBkgPdfRatio,
};
pub use signal_generation::{
    PointLikeSourceSignalGenerationMethod, SignalCandidates, SignalGenerationMethod,
};
pub use source::{
    PointLikeSource, SingleSourceFitParameterMapper, SourceHypoGroup, SourceHypoGroupManager,
    SourceParams,
};
pub use trialdata::{DataFieldFn, TrialDataManager};
