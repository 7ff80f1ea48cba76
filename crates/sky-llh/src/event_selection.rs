//! Event selection: split trial events into likelihood-evaluated events and pure
//! background.

use crate::event_store::EventArray;
use crate::source::SourceHypoGroupManager;
use sky_core::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Deterministic selection of the events passed to the likelihood.
pub trait EventSelectionMethod: Send + Sync + fmt::Debug {
    /// Subset of `events` that may contain signal.
    fn select_events(&self, events: &EventArray) -> Result<EventArray>;

    /// Follow a new source hypothesis.
    fn change_source_hypo_group_manager(&mut self, shg_mgr: Arc<SourceHypoGroupManager>);
}

/// Selects every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllEventSelectionMethod;

impl EventSelectionMethod for AllEventSelectionMethod {
    fn select_events(&self, events: &EventArray) -> Result<EventArray> {
        Ok(events.clone())
    }

    fn change_source_hypo_group_manager(&mut self, _shg_mgr: Arc<SourceHypoGroupManager>) {}
}

/// Selects events within `delta_angle` in declination of any source.
#[derive(Debug, Clone)]
pub struct DecBandEventSelectionMethod {
    shg_mgr: Arc<SourceHypoGroupManager>,
    delta_angle: f64,
}

impl DecBandEventSelectionMethod {
    /// Create with band half-width `delta_angle` (radians, positive).
    pub fn new(shg_mgr: Arc<SourceHypoGroupManager>, delta_angle: f64) -> Result<Self> {
        if !delta_angle.is_finite() || delta_angle <= 0.0 {
            return Err(Error::Validation(format!(
                "declination band half-width must be positive, got {delta_angle}"
            )));
        }
        Ok(Self { shg_mgr, delta_angle })
    }

    /// Band half-width in radians.
    pub fn delta_angle(&self) -> f64 {
        self.delta_angle
    }
}

impl EventSelectionMethod for DecBandEventSelectionMethod {
    fn select_events(&self, events: &EventArray) -> Result<EventArray> {
        let dec = events.require_column("dec")?;
        let src_decs: Vec<f64> = self.shg_mgr.sources().iter().map(|s| s.dec()).collect();
        let mask: Vec<bool> = dec
            .iter()
            .map(|d| src_decs.iter().any(|s| (d - s).abs() <= self.delta_angle))
            .collect();
        events.filter(&mask)
    }

    fn change_source_hypo_group_manager(&mut self, shg_mgr: Arc<SourceHypoGroupManager>) {
        self.shg_mgr = shg_mgr;
    }
}
