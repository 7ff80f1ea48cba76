use super::{PdfKind, PdfRatio, check_out_len};
use crate::binning::{Binning, floored_density};
use crate::event_store::EventArray;
use crate::source::{PointLikeSource, SourceParams};
use sky_core::{Error, Result};
use std::f64::consts::LN_10;

const GAMMA: &str = "gamma";

/// Energy ratio: power-law signal `E^-γ` in `x = log10(E / GeV)` over a background
/// density of `x` conditional on `sin(dec)`, both taken from experimental events.
///
/// The signal density on the binning support `[a, b]` is
/// `p_s(x | γ) = 10^{(1-γ) x} / I(1-γ)` with `I(k) = ∫_a^b 10^{k x} dx`.
#[derive(Debug, Clone)]
pub struct EnergySigOverBkgPdfRatio {
    sin_dec_binning: Binning,
    log_e_binning: Binning,
    /// Conditional background density, row-major `[sin_dec_bin][log_e_bin]`.
    bkg_density: Vec<Vec<f64>>,
    param_names: Vec<String>,
}

impl EnergySigOverBkgPdfRatio {
    /// Build the conditional background density from experimental events.
    pub fn new(exp: &EventArray, sin_dec_binning: Binning, log_e_binning: Binning) -> Result<Self> {
        let dec = exp.require_column("dec")?;
        let log_e = exp.require_column("log_energy")?;
        let n_sd = sin_dec_binning.n_bins();
        let mut counts = vec![vec![0.0; log_e_binning.n_bins()]; n_sd];
        for (d, &x) in dec.iter().zip(log_e) {
            counts[sin_dec_binning.clamped_bin(d.sin())][log_e_binning.clamped_bin(x)] += 1.0;
        }
        let bkg_density = counts.iter().map(|row| floored_density(&log_e_binning, row)).collect();
        Ok(Self {
            sin_dec_binning,
            log_e_binning,
            bkg_density,
            param_names: vec![GAMMA.to_string()],
        })
    }

    /// 10 equal `sin(dec)` bins and 32 equal `log10(E)` bins on `[1, 9]`.
    pub fn with_default_binning(exp: &EventArray) -> Result<Self> {
        Self::new(exp, Binning::uniform(-1.0, 1.0, 10), Binning::uniform(1.0, 9.0, 32))
    }

    /// `ln I(k)` and `I'(k) / I(k)`.
    fn log_norm(&self, k: f64) -> (f64, f64) {
        let a = self.log_e_binning.lower();
        let b = self.log_e_binning.upper();
        let kl = k * LN_10;
        if kl.abs() < 1e-8 {
            let i = (b - a) + kl * (b * b - a * a) / 2.0;
            let di = LN_10 * (b * b - a * a) / 2.0
                + k * LN_10 * LN_10 * (b.powi(3) - a.powi(3)) / 3.0;
            return (i.ln(), di / i);
        }
        let eb = (kl * b).exp();
        let ea = (kl * a).exp();
        let i = (eb - ea) / kl;
        let di = LN_10 * (b * eb - a * ea) / kl - i / k;
        (i.ln(), di / i)
    }

    fn spectral_index(params: &SourceParams) -> Result<f64> {
        let gamma = params.get(GAMMA)?;
        if !gamma.is_finite() {
            return Err(Error::Computation(format!("non-finite spectral index {gamma}")));
        }
        Ok(gamma)
    }

    /// Per-event ratio and `d ln p_s / dγ`.
    fn ratio_and_dlog(
        &self,
        events: &EventArray,
        gamma: f64,
        out: &mut [f64],
        mut dlog: Option<&mut [f64]>,
    ) -> Result<()> {
        check_out_len(events, out)?;
        let sin_dec = events.require_column("sin_dec")?;
        let log_e = events.require_column("log_energy")?;
        let k = 1.0 - gamma;
        let (ln_i, di_over_i) = self.log_norm(k);
        let lo = self.log_e_binning.lower();
        let hi = self.log_e_binning.upper();

        for i in 0..out.len() {
            let x = log_e[i].clamp(lo, hi);
            let ps = (k * LN_10 * x - ln_i).exp();
            let row = &self.bkg_density[self.sin_dec_binning.clamped_bin(sin_dec[i])];
            let pb = row[self.log_e_binning.clamped_bin(x)];
            out[i] = ps / pb;
            if let Some(d) = dlog.as_deref_mut() {
                d[i] = -LN_10 * x + di_over_i;
            }
        }
        Ok(())
    }
}

impl PdfRatio for EnergySigOverBkgPdfRatio {
    fn kind(&self) -> PdfKind {
        PdfKind::Energy
    }

    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn required_fields(&self) -> Vec<String> {
        ["sin_dec", "log_energy"].iter().map(|s| s.to_string()).collect()
    }

    fn evaluate(
        &self,
        events: &EventArray,
        _source: &PointLikeSource,
        params: &SourceParams,
        out: &mut [f64],
    ) -> Result<()> {
        self.ratio_and_dlog(events, Self::spectral_index(params)?, out, None)
    }

    fn gradient(
        &self,
        events: &EventArray,
        _source: &PointLikeSource,
        params: &SourceParams,
        param: &str,
        out: &mut [f64],
    ) -> Result<()> {
        check_out_len(events, out)?;
        if param != GAMMA {
            out.fill(0.0);
            return Ok(());
        }
        let mut dlog = vec![0.0; out.len()];
        self.ratio_and_dlog(events, Self::spectral_index(params)?, out, Some(&mut dlog))?;
        for (o, d) in out.iter_mut().zip(&dlog) {
            *o *= d;
        }
        Ok(())
    }
}
