//! Data samples and their loaded event arrays.

use crate::event_store::EventArray;
use serde::{Deserialize, Serialize};
use sky_core::{Error, Result};
use std::path::PathBuf;

/// Columns every experimental (and Monte-Carlo) event array must carry.
///
/// Angles are in radians, `log_energy` is `log10(E / GeV)` of the reconstructed energy.
pub const EXP_FIELDS: [&str; 4] = ["ra", "dec", "ang_err", "log_energy"];

/// Additional columns of Monte-Carlo event arrays.
///
/// `true_energy` is in GeV, `mcweight` is the one-weight in GeV cm² sr.
pub const MC_FIELDS: [&str; 4] = ["true_ra", "true_dec", "true_energy", "mcweight"];

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Immutable description of a data sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    livetime_days: f64,
    #[serde(default)]
    exp_files: Vec<PathBuf>,
    #[serde(default)]
    mc_files: Vec<PathBuf>,
}

impl Dataset {
    /// Create a dataset. The livetime must be positive and finite.
    pub fn new(name: impl Into<String>, livetime_days: f64) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Validation("dataset name must not be empty".into()));
        }
        if !livetime_days.is_finite() || livetime_days <= 0.0 {
            return Err(Error::Validation(format!(
                "dataset '{name}' livetime must be positive, got {livetime_days}"
            )));
        }
        Ok(Self { name, livetime_days, exp_files: Vec::new(), mc_files: Vec::new() })
    }

    /// Attach the experimental data file locations.
    pub fn with_exp_files(mut self, files: Vec<PathBuf>) -> Self {
        self.exp_files = files;
        self
    }

    /// Attach the Monte-Carlo file locations.
    pub fn with_mc_files(mut self, files: Vec<PathBuf>) -> Self {
        self.mc_files = files;
        self
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Livetime in days.
    pub fn livetime_days(&self) -> f64 {
        self.livetime_days
    }

    /// Livetime in seconds.
    pub fn livetime_seconds(&self) -> f64 {
        self.livetime_days * SECONDS_PER_DAY
    }

    /// Experimental data file locations.
    pub fn exp_files(&self) -> &[PathBuf] {
        &self.exp_files
    }

    /// Monte-Carlo file locations.
    pub fn mc_files(&self) -> &[PathBuf] {
        &self.mc_files
    }
}

/// Loaded event arrays of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetData {
    exp: EventArray,
    mc: EventArray,
}

impl DatasetData {
    /// Wrap loaded events, checking the required columns.
    pub fn new(exp: EventArray, mc: EventArray) -> Result<Self> {
        exp.require_columns(&EXP_FIELDS)?;
        mc.require_columns(&EXP_FIELDS)?;
        mc.require_columns(&MC_FIELDS)?;
        if mc.require_column("mcweight")?.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Validation("mcweight must be finite and non-negative".into()));
        }
        Ok(Self { exp, mc })
    }

    /// Experimental events.
    pub fn exp(&self) -> &EventArray {
        &self.exp
    }

    /// Monte-Carlo events.
    pub fn mc(&self) -> &EventArray {
        &self.mc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_livetime() {
        let ds = Dataset::new("IC86", 2.0).unwrap();
        assert_eq!(ds.livetime_seconds(), 172_800.0);
        assert!(Dataset::new("IC86", 0.0).is_err());
        assert!(Dataset::new("", 1.0).is_err());
    }

    #[test]
    fn test_dataset_data_requires_columns() {
        let exp = EventArray::from_columns(
            EXP_FIELDS.iter().map(|n| (n.to_string(), vec![0.0])),
        )
        .unwrap();
        let mc = EventArray::from_columns(
            EXP_FIELDS.iter().chain(MC_FIELDS.iter()).map(|n| (n.to_string(), vec![1.0])),
        )
        .unwrap();
        assert!(DatasetData::new(exp.clone(), mc).is_ok());
        assert!(DatasetData::new(exp.clone(), exp).is_err());
    }
}
