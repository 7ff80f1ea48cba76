//! Source hypotheses and the mapping of fit parameters onto source parameters.

use crate::detsigyield::DetSigYieldImplMethod;
use crate::flux::FluxModel;
use crate::signal_generation::SignalGenerationMethod;
use serde::{Deserialize, Serialize};
use sky_core::{Error, FitParameter, Result};
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

/// A point-like source at equatorial coordinates (radians).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLikeSource {
    ra: f64,
    dec: f64,
}

impl PointLikeSource {
    /// Create a source. `dec` must lie in `[-π/2, π/2]`.
    pub fn new(ra: f64, dec: f64) -> Result<Self> {
        if !ra.is_finite() || !dec.is_finite() || dec.abs() > FRAC_PI_2 {
            return Err(Error::Validation(format!("invalid source position ra={ra}, dec={dec}")));
        }
        Ok(Self { ra: crate::math::wrap_ra(ra), dec })
    }

    /// Right ascension.
    pub fn ra(&self) -> f64 {
        self.ra
    }

    /// Declination.
    pub fn dec(&self) -> f64 {
        self.dec
    }
}

/// Named source parameter values, e.g. `{"gamma": 2.0}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceParams {
    values: BTreeMap<String, f64>,
}

impl SourceParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Value of a parameter.
    pub fn get(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| Error::Validation(format!("missing source parameter '{name}'")))
    }

    /// Whether a parameter is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

impl FromIterator<(String, f64)> for SourceParams {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Sources sharing one flux model, detector-signal-yield implementation methods and
/// signal-generation method.
#[derive(Debug, Clone)]
pub struct SourceHypoGroup {
    sources: Vec<PointLikeSource>,
    fluxmodel: Arc<dyn FluxModel>,
    detsigyield_implmethods: Vec<Arc<dyn DetSigYieldImplMethod>>,
    sig_gen_method: Option<Arc<dyn SignalGenerationMethod>>,
}

impl SourceHypoGroup {
    /// Create a group. Requires at least one source and one implementation method.
    pub fn new(
        sources: Vec<PointLikeSource>,
        fluxmodel: Arc<dyn FluxModel>,
        detsigyield_implmethods: Vec<Arc<dyn DetSigYieldImplMethod>>,
        sig_gen_method: Option<Arc<dyn SignalGenerationMethod>>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::Validation("source hypothesis group has no sources".into()));
        }
        if detsigyield_implmethods.is_empty() {
            return Err(Error::Validation(
                "source hypothesis group needs at least one detector signal yield method".into(),
            ));
        }
        Ok(Self { sources, fluxmodel, detsigyield_implmethods, sig_gen_method })
    }

    /// Sources of this group.
    pub fn sources(&self) -> &[PointLikeSource] {
        &self.sources
    }

    /// Flux model.
    pub fn fluxmodel(&self) -> &Arc<dyn FluxModel> {
        &self.fluxmodel
    }

    /// Detector-signal-yield implementation methods.
    pub fn detsigyield_implmethods(&self) -> &[Arc<dyn DetSigYieldImplMethod>] {
        &self.detsigyield_implmethods
    }

    /// Signal-generation method, if signal injection is supported.
    pub fn sig_gen_method(&self) -> Option<&Arc<dyn SignalGenerationMethod>> {
        self.sig_gen_method.as_ref()
    }
}

/// Ordered source hypothesis groups. Sources are indexed globally across groups.
#[derive(Debug, Clone, Default)]
pub struct SourceHypoGroupManager {
    groups: Vec<SourceHypoGroup>,
}

impl SourceHypoGroupManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager holding a single group.
    pub fn single(group: SourceHypoGroup) -> Self {
        Self { groups: vec![group] }
    }

    /// Append a group.
    pub fn add_group(&mut self, group: SourceHypoGroup) {
        self.groups.push(group);
    }

    /// Groups in order.
    pub fn groups(&self) -> &[SourceHypoGroup] {
        &self.groups
    }

    /// Total number of sources.
    pub fn n_sources(&self) -> usize {
        self.groups.iter().map(|g| g.sources.len()).sum()
    }

    /// All sources in global index order.
    pub fn sources(&self) -> Vec<PointLikeSource> {
        self.groups.iter().flat_map(|g| g.sources.iter().copied()).collect()
    }

    fn locate(&self, src_idx: usize) -> Result<(usize, usize)> {
        let mut offset = 0;
        for (gi, g) in self.groups.iter().enumerate() {
            if src_idx < offset + g.sources.len() {
                return Ok((gi, src_idx - offset));
            }
            offset += g.sources.len();
        }
        Err(Error::Validation(format!(
            "source index {src_idx} out of range for {} sources",
            self.n_sources()
        )))
    }

    /// Group containing the source with global index `src_idx`.
    pub fn group_by_src_idx(&self, src_idx: usize) -> Result<&SourceHypoGroup> {
        let (gi, _) = self.locate(src_idx)?;
        Ok(&self.groups[gi])
    }

    /// Source with global index `src_idx`.
    pub fn source(&self, src_idx: usize) -> Result<PointLikeSource> {
        let (gi, si) = self.locate(src_idx)?;
        Ok(self.groups[gi].sources[si])
    }

    /// Flux model of the group containing source `src_idx`.
    pub fn get_fluxmodel_by_src_idx(&self, src_idx: usize) -> Result<Arc<dyn FluxModel>> {
        Ok(Arc::clone(&self.group_by_src_idx(src_idx)?.fluxmodel))
    }

    /// Detector-signal-yield implementation methods of the group containing source `src_idx`.
    pub fn get_detsigyield_implmethod_list_by_src_idx(
        &self,
        src_idx: usize,
    ) -> Result<&[Arc<dyn DetSigYieldImplMethod>]> {
        Ok(&self.group_by_src_idx(src_idx)?.detsigyield_implmethods)
    }

    /// Copy of this manager with source `src_idx` replaced.
    pub fn with_source(&self, src_idx: usize, source: PointLikeSource) -> Result<Self> {
        let (gi, si) = self.locate(src_idx)?;
        let mut out = self.clone();
        out.groups[gi].sources[si] = source;
        Ok(out)
    }
}

/// Maps the non-ns global fit parameters of a single-source analysis onto named
/// source parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleSourceFitParameterMapper {
    entries: Vec<(FitParameter, String)>,
}

impl SingleSourceFitParameterMapper {
    /// Empty mapper (no source fit parameters).
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a fit parameter mapped to the source parameter `src_param_name`.
    pub fn def_fit_parameter(
        &mut self,
        fitparam: FitParameter,
        src_param_name: impl Into<String>,
    ) -> Result<()> {
        let src_param_name = src_param_name.into();
        if self.entries.iter().any(|(fp, _)| fp.name() == fitparam.name()) {
            return Err(Error::Validation(format!(
                "fit parameter '{}' already mapped",
                fitparam.name()
            )));
        }
        if self.entries.iter().any(|(_, s)| *s == src_param_name) {
            return Err(Error::Validation(format!(
                "source parameter '{src_param_name}' already mapped"
            )));
        }
        self.entries.push((fitparam, src_param_name));
        Ok(())
    }

    /// Number of mapped fit parameters.
    pub fn n_fitparams(&self) -> usize {
        self.entries.len()
    }

    /// Mapped fit parameters in definition order.
    pub fn fitparams(&self) -> impl Iterator<Item = &FitParameter> {
        self.entries.iter().map(|(fp, _)| fp)
    }

    /// Source parameter names in definition order.
    pub fn src_param_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, s)| s.as_str()).collect()
    }

    /// Index of the fit parameter mapped onto `src_param_name`.
    pub fn index_of_src_param(&self, src_param_name: &str) -> Option<usize> {
        self.entries.iter().position(|(_, s)| s == src_param_name)
    }

    /// Named source parameters for a vector of mapped fit-parameter values.
    pub fn src_params(&self, values: &[f64]) -> Result<SourceParams> {
        if values.len() != self.entries.len() {
            return Err(Error::Validation(format!(
                "expected {} source fit parameter values, got {}",
                self.entries.len(),
                values.len()
            )));
        }
        Ok(self.entries.iter().zip(values).map(|((_, s), &v)| (s.clone(), v)).collect())
    }
}
