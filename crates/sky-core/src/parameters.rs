//! Global fit parameters of a log-likelihood-ratio function.

use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named fit parameter with box bounds and an initial value.
///
/// Constructed once through [`FitParameter::new`], which validates bounds and the
/// initial value; the fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    name: String,
    valmin: f64,
    valmax: f64,
    initial: f64,
}

impl FitParameter {
    /// Create a fit parameter. Requires `valmin <= initial <= valmax` and no NaNs.
    pub fn new(name: impl Into<String>, valmin: f64, valmax: f64, initial: f64) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Validation("fit parameter name must not be empty".into()));
        }
        if valmin.is_nan() || valmax.is_nan() || valmin > valmax {
            return Err(Error::Validation(format!(
                "fit parameter '{name}' has invalid bounds ({valmin}, {valmax})"
            )));
        }
        if !initial.is_finite() || initial < valmin || initial > valmax {
            return Err(Error::Validation(format!(
                "fit parameter '{name}' initial value {initial} outside bounds ({valmin}, {valmax})"
            )));
        }
        Ok(Self { name, valmin, valmax, initial })
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower bound.
    pub fn valmin(&self) -> f64 {
        self.valmin
    }

    /// Upper bound.
    pub fn valmax(&self) -> f64 {
        self.valmax
    }

    /// Initial value.
    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Bounds as `(valmin, valmax)`.
    pub fn bounds(&self) -> (f64, f64) {
        (self.valmin, self.valmax)
    }

    /// Draw a uniform value inside the bounds. Unbounded parameters return `initial`.
    pub fn random_value<R: Rng>(&self, rng: &mut R) -> f64 {
        let range = self.valmax - self.valmin;
        if !range.is_finite() || range <= 0.0 {
            return self.initial;
        }
        self.valmin + range * rng.random::<f64>()
    }
}

/// Ordered, uniquely named set of fit parameters.
///
/// Fit-parameter value vectors are always indexed in the order of this set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitParameterSet {
    params: Vec<FitParameter>,
}

impl FitParameterSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Add a parameter at the back, or at the front when `at_front` is set.
    pub fn add(&mut self, param: FitParameter, at_front: bool) -> Result<()> {
        if self.index_of(param.name()).is_some() {
            return Err(Error::Validation(format!(
                "fit parameter '{}' is already part of the set",
                param.name()
            )));
        }
        if at_front {
            self.params.insert(0, param);
        } else {
            self.params.push(param);
        }
        Ok(())
    }

    /// Parameters in order.
    pub fn params(&self) -> &[FitParameter] {
        &self.params
    }

    /// Parameter at `idx`.
    pub fn get(&self, idx: usize) -> Option<&FitParameter> {
        self.params.get(idx)
    }

    /// Index of the parameter called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Parameter names in order.
    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Initial values in order.
    pub fn initials(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.initial).collect()
    }

    /// Bounds in order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.params.iter().map(FitParameter::bounds).collect()
    }

    /// Uniformly random initial values inside the bounds.
    pub fn random_initials<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.params.iter().map(|p| p.random_value(rng)).collect()
    }

    /// Map a value vector onto parameter names.
    pub fn fitparam_values_to_dict(&self, values: &[f64]) -> Result<BTreeMap<String, f64>> {
        if values.len() != self.params.len() {
            return Err(Error::Validation(format!(
                "fit parameter value length mismatch: expected {}, got {}",
                self.params.len(),
                values.len()
            )));
        }
        Ok(self.params.iter().map(|p| p.name.clone()).zip(values.iter().copied()).collect())
    }
}
