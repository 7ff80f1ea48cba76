use super::{PdfKind, PdfRatio, check_out_len};
use crate::binning::{Binning, floored_density};
use crate::event_store::EventArray;
use crate::math::angular_distance;
use crate::source::{PointLikeSource, SourceParams};
use sky_core::Result;
use std::f64::consts::TAU;

/// Lower limit applied to per-event angular uncertainties (radians).
const MIN_ANG_ERR: f64 = 1e-4;

/// Spatial ratio: 2D Gaussian point-spread function around the source over a
/// background that is uniform in right ascension and follows the experimental
/// `sin(dec)` distribution.
#[derive(Debug, Clone)]
pub struct SpatialSigOverBkgPdfRatio {
    sin_dec_binning: Binning,
    bkg_density: Vec<f64>,
    param_names: Vec<String>,
}

impl SpatialSigOverBkgPdfRatio {
    /// Build the background `sin(dec)` density from experimental events.
    pub fn new(exp: &EventArray, sin_dec_binning: Binning) -> Result<Self> {
        let sin_dec: Vec<f64> = exp.require_column("dec")?.iter().map(|d| d.sin()).collect();
        let counts = sin_dec_binning.histogram(&sin_dec, None);
        let bkg_density = floored_density(&sin_dec_binning, &counts);
        Ok(Self { sin_dec_binning, bkg_density, param_names: Vec::new() })
    }

    /// Same as [`SpatialSigOverBkgPdfRatio::new`] with 20 equal `sin(dec)` bins.
    pub fn with_default_binning(exp: &EventArray) -> Result<Self> {
        Self::new(exp, Binning::uniform(-1.0, 1.0, 20))
    }

    /// Background density per steradian at `sin(dec)`.
    pub fn bkg_pdf(&self, sin_dec: f64) -> f64 {
        self.bkg_density[self.sin_dec_binning.clamped_bin(sin_dec)] / TAU
    }
}

impl PdfRatio for SpatialSigOverBkgPdfRatio {
    fn kind(&self) -> PdfKind {
        PdfKind::Spatial
    }

    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn required_fields(&self) -> Vec<String> {
        ["ra", "dec", "ang_err", "sin_dec"].iter().map(|s| s.to_string()).collect()
    }

    fn evaluate(
        &self,
        events: &EventArray,
        source: &PointLikeSource,
        _params: &SourceParams,
        out: &mut [f64],
    ) -> Result<()> {
        check_out_len(events, out)?;
        let ra = events.require_column("ra")?;
        let dec = events.require_column("dec")?;
        let ang_err = events.require_column("ang_err")?;
        let sin_dec = events.require_column("sin_dec")?;
        for (i, o) in out.iter_mut().enumerate() {
            let sigma = ang_err[i].max(MIN_ANG_ERR);
            let psi = angular_distance(source.ra(), source.dec(), ra[i], dec[i]);
            let sig = (-0.5 * (psi / sigma).powi(2)).exp() / (TAU * sigma * sigma);
            *o = sig / self.bkg_pdf(sin_dec[i]);
        }
        Ok(())
    }

    fn gradient(
        &self,
        events: &EventArray,
        _source: &PointLikeSource,
        _params: &SourceParams,
        _param: &str,
        out: &mut [f64],
    ) -> Result<()> {
        check_out_len(events, out)?;
        out.fill(0.0);
        Ok(())
    }
}
