//! Signal-over-background PDF ratios evaluated per event.

use crate::event_store::EventArray;
use crate::source::{PointLikeSource, SourceParams};
use sky_core::{Error, Result};
use std::fmt;

mod energy;
mod product;
mod spatial;

pub use energy::EnergySigOverBkgPdfRatio;
pub use product::MultiDimPdfRatio;
pub use spatial::SpatialSigOverBkgPdfRatio;

/// Observable space a PDF ratio is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdfKind {
    /// Direction on the sky.
    Spatial,
    /// Reconstructed energy.
    Energy,
    /// Event time.
    Time,
    /// Several observables jointly.
    MultiDim,
}

/// Ratio `S/B` of signal to background probability density for each event.
pub trait PdfRatio: Send + Sync + fmt::Debug {
    /// Observable space of this ratio.
    fn kind(&self) -> PdfKind;

    /// Source parameters the ratio depends on. Empty for parameter-independent ratios.
    fn param_names(&self) -> &[String];

    /// Event columns read by [`PdfRatio::evaluate`] and [`PdfRatio::gradient`].
    fn required_fields(&self) -> Vec<String>;

    /// Evaluate the ratio for all events.
    ///
    /// `out` must have length `events.n_events()`.
    fn evaluate(
        &self,
        events: &EventArray,
        source: &PointLikeSource,
        params: &SourceParams,
        out: &mut [f64],
    ) -> Result<()>;

    /// Derivative of the ratio w.r.t. the source parameter `param` for all events.
    ///
    /// Parameters not in [`PdfRatio::param_names`] have zero derivative.
    fn gradient(
        &self,
        events: &EventArray,
        source: &PointLikeSource,
        params: &SourceParams,
        param: &str,
        out: &mut [f64],
    ) -> Result<()>;

    /// Whether the ratio depends on `param`.
    fn depends_on(&self, param: &str) -> bool {
        self.param_names().iter().any(|p| p == param)
    }
}

pub(crate) fn check_out_len(events: &EventArray, out: &[f64]) -> Result<()> {
    if out.len() != events.n_events() {
        return Err(Error::Validation(format!(
            "output buffer has length {}, expected {}",
            out.len(),
            events.n_events()
        )));
    }
    Ok(())
}
