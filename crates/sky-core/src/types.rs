//! Trial result records and tables.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Name of the injected-signal-count field.
pub const FIELD_N_SIG: &str = "n_sig";
/// Name of the test-statistic field.
pub const FIELD_TS: &str = "TS";

/// Result of one trial: injected signal count, test statistic and best-fit values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Number of injected signal events.
    pub n_sig: u64,
    /// Test-statistic value.
    #[serde(rename = "TS")]
    pub ts: f64,
    /// Best-fit values in fit-parameter-set order.
    pub fitparam_values: Vec<f64>,
}

/// Homogeneous table of trial records.
///
/// Field layout: `n_sig`, `TS`, then one field per fit-parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialTable {
    fitparam_names: Vec<String>,
    records: Vec<TrialRecord>,
    /// Number of trials whose maximization did not report convergence.
    pub n_nonconverged: usize,
}

impl TrialTable {
    /// Empty table with the given fit-parameter fields.
    pub fn new(fitparam_names: Vec<String>) -> Self {
        Self { fitparam_names, records: Vec::new(), n_nonconverged: 0 }
    }

    /// Field names in layout order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(2 + self.fitparam_names.len());
        names.push(FIELD_N_SIG.to_string());
        names.push(FIELD_TS.to_string());
        names.extend(self.fitparam_names.iter().cloned());
        names
    }

    /// Fit-parameter field names.
    pub fn fitparam_names(&self) -> &[String] {
        &self.fitparam_names
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows in insertion order.
    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    /// Append a row; its fit-parameter vector must match the table schema.
    pub fn push(&mut self, record: TrialRecord) -> Result<()> {
        if record.fitparam_values.len() != self.fitparam_names.len() {
            return Err(Error::Validation(format!(
                "trial record has {} fit parameter values, table expects {}",
                record.fitparam_values.len(),
                self.fitparam_names.len()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// Concatenate another table with the same schema.
    pub fn extend(&mut self, other: TrialTable) -> Result<()> {
        if other.fitparam_names != self.fitparam_names {
            return Err(Error::Validation(format!(
                "cannot concatenate trial tables with fields {:?} and {:?}",
                self.fitparam_names, other.fitparam_names
            )));
        }
        self.n_nonconverged += other.n_nonconverged;
        self.records.extend(other.records);
        Ok(())
    }

    /// `n_sig` column.
    pub fn n_sig(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.n_sig).collect()
    }

    /// `TS` column.
    pub fn ts(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.ts).collect()
    }

    /// Any column by field name, as `f64`.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        match name {
            FIELD_N_SIG => Some(self.records.iter().map(|r| r.n_sig as f64).collect()),
            FIELD_TS => Some(self.ts()),
            _ => {
                let idx = self.fitparam_names.iter().position(|n| n == name)?;
                Some(self.records.iter().map(|r| r.fitparam_values[idx]).collect())
            }
        }
    }
}
