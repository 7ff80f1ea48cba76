//! Per-dataset trial data: selected events plus derived per-event fields.

use crate::dataset::EXP_FIELDS;
use crate::event_store::EventArray;
use sky_core::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Function computing one derived per-event field from the trial events.
pub type DataFieldFn = Arc<dyn Fn(&EventArray) -> Result<Vec<f64>> + Send + Sync>;

/// Derivation of a well-known field, if `name` is one.
pub fn standard_data_field(name: &str) -> Option<DataFieldFn> {
    match name {
        "sin_dec" => Some(Arc::new(|ev: &EventArray| {
            Ok(ev.require_column("dec")?.iter().map(|d| d.sin()).collect())
        })),
        "cos_dec" => Some(Arc::new(|ev: &EventArray| {
            Ok(ev.require_column("dec")?.iter().map(|d| d.cos()).collect())
        })),
        _ => None,
    }
}

/// Holds the current trial's selected events of one dataset and computes the auxiliary
/// fields the likelihood needs on them.
#[derive(Clone, Default)]
pub struct TrialDataManager {
    fields: Vec<(String, DataFieldFn)>,
    events: EventArray,
    n_pure_bkg_events: u64,
    initialized: bool,
}

impl fmt::Debug for TrialDataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialDataManager")
            .field("fields", &self.data_field_names())
            .field("n_selected", &self.events.n_events())
            .field("n_pure_bkg_events", &self.n_pure_bkg_events)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl TrialDataManager {
    /// Manager without derived fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a derived field. Names must be unique.
    pub fn add_data_field(&mut self, name: impl Into<String>, func: DataFieldFn) -> Result<()> {
        let name = name.into();
        if self.has_data_field(&name) {
            return Err(Error::Validation(format!("data field '{name}' already defined")));
        }
        self.fields.push((name, func));
        Ok(())
    }

    /// Builder form of [`TrialDataManager::add_data_field`].
    pub fn with_data_field(mut self, name: impl Into<String>, func: DataFieldFn) -> Result<Self> {
        self.add_data_field(name, func)?;
        Ok(self)
    }

    /// Whether a derived field with this name is registered.
    pub fn has_data_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Names of the registered derived fields.
    pub fn data_field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Make sure every column in `required` will exist on the trial events.
    ///
    /// Experimental columns are always present; other well-known fields are registered
    /// on demand. Anything else is a configuration error.
    pub fn ensure_fields<S: AsRef<str>>(&mut self, required: &[S]) -> Result<()> {
        for name in required {
            let name = name.as_ref();
            if EXP_FIELDS.contains(&name) || self.has_data_field(name) {
                continue;
            }
            let func = standard_data_field(name).ok_or_else(|| {
                Error::Configuration(format!(
                    "no data field '{name}' is defined and it cannot be derived"
                ))
            })?;
            self.fields.push((name.to_string(), func));
        }
        Ok(())
    }

    /// Store the selected events of a new trial and compute the derived fields on them.
    pub fn initialize_trial(&mut self, mut events: EventArray, n_pure_bkg_events: u64) -> Result<()> {
        for (name, func) in &self.fields {
            let values = func(&events)?;
            events.set_column(name.clone(), values)?;
        }
        self.events = events;
        self.n_pure_bkg_events = n_pure_bkg_events;
        self.initialized = true;
        Ok(())
    }

    /// Selected events of the current trial, including derived fields.
    pub fn events(&self) -> &EventArray {
        &self.events
    }

    /// Number of selected events.
    pub fn n_selected(&self) -> usize {
        self.events.n_events()
    }

    /// Number of events removed by event selection.
    pub fn n_pure_bkg_events(&self) -> u64 {
        self.n_pure_bkg_events
    }

    /// Total number of trial events, selected plus pure background.
    pub fn n_events(&self) -> u64 {
        self.events.n_events() as u64 + self.n_pure_bkg_events
    }

    /// Whether a trial has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
