//! Signal-event candidates from Monte-Carlo and their placement onto sources.

use crate::event_store::EventArray;
use crate::flux::FluxModel;
use crate::math::{band_solid_angle, rotate};
use crate::source::PointLikeSource;
use sky_core::{Error, Result};
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Weighted Monte-Carlo events eligible for injection, one entry per (event, source) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalCandidates {
    /// Row index into the Monte-Carlo event array.
    pub mc_indices: Vec<usize>,
    /// Index into the source list the event would be injected for.
    pub src_indices: Vec<usize>,
    /// Expected number of detected signal events represented by the entry.
    pub weights: Vec<f64>,
}

impl SignalCandidates {
    /// Number of candidate entries.
    pub fn len(&self) -> usize {
        self.mc_indices.len()
    }

    /// Whether there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.mc_indices.is_empty()
    }

    /// Sum of the weights, the expected signal count of the dataset.
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// How Monte-Carlo events are turned into injected signal events.
pub trait SignalGenerationMethod: Send + Sync + fmt::Debug {
    /// Candidate events of one dataset for the given sources and flux.
    fn signal_candidates(
        &self,
        mc: &EventArray,
        sources: &[PointLikeSource],
        fluxmodel: &dyn FluxModel,
        livetime_days: f64,
    ) -> Result<SignalCandidates>;

    /// Transform sampled Monte-Carlo rows into signal events for their sources.
    ///
    /// `src_indices[i]` is the source of row `i`.
    fn post_process(
        &self,
        events: EventArray,
        sources: &[PointLikeSource],
        src_indices: &[usize],
    ) -> Result<EventArray>;
}

/// Point-like source injection: Monte-Carlo events with true declination close to the
/// source, weighted by the flux, rotated onto the source position.
#[derive(Debug, Clone, Copy)]
pub struct PointLikeSourceSignalGenerationMethod {
    src_sin_dec_half_bandwidth: f64,
}

impl Default for PointLikeSourceSignalGenerationMethod {
    fn default() -> Self {
        Self { src_sin_dec_half_bandwidth: 1f64.to_radians().sin() }
    }
}

impl PointLikeSourceSignalGenerationMethod {
    /// Create with the half width of the true `sin(dec)` band around each source.
    pub fn new(src_sin_dec_half_bandwidth: f64) -> Result<Self> {
        if !src_sin_dec_half_bandwidth.is_finite()
            || src_sin_dec_half_bandwidth <= 0.0
            || src_sin_dec_half_bandwidth > 1.0
        {
            return Err(Error::Validation(format!(
                "sin(dec) half bandwidth must be in (0, 1], got {src_sin_dec_half_bandwidth}"
            )));
        }
        Ok(Self { src_sin_dec_half_bandwidth })
    }

    /// `[sin_lo, sin_hi]` band around a source, clipped to `[-1, 1]`.
    pub fn band(&self, source: &PointLikeSource) -> (f64, f64) {
        let s = source.dec().sin();
        (
            (s - self.src_sin_dec_half_bandwidth).max(-1.0),
            (s + self.src_sin_dec_half_bandwidth).min(1.0),
        )
    }
}

impl SignalGenerationMethod for PointLikeSourceSignalGenerationMethod {
    fn signal_candidates(
        &self,
        mc: &EventArray,
        sources: &[PointLikeSource],
        fluxmodel: &dyn FluxModel,
        livetime_days: f64,
    ) -> Result<SignalCandidates> {
        let true_dec = mc.require_column("true_dec")?;
        let true_energy = mc.require_column("true_energy")?;
        let mcweight = mc.require_column("mcweight")?;
        let livetime_s = livetime_days * SECONDS_PER_DAY;

        let mut out = SignalCandidates::default();
        for (src_idx, src) in sources.iter().enumerate() {
            let (lo, hi) = self.band(src);
            let omega = band_solid_angle(lo, hi);
            for i in 0..mc.n_events() {
                let s = true_dec[i].sin();
                if s < lo || s > hi {
                    continue;
                }
                let w = mcweight[i] * fluxmodel.flux(true_energy[i]) * livetime_s / omega;
                if !w.is_finite() || w < 0.0 {
                    return Err(Error::Computation(format!(
                        "invalid signal weight {w} for MC event {i}"
                    )));
                }
                out.mc_indices.push(i);
                out.src_indices.push(src_idx);
                out.weights.push(w);
            }
        }
        Ok(out)
    }

    fn post_process(
        &self,
        mut events: EventArray,
        sources: &[PointLikeSource],
        src_indices: &[usize],
    ) -> Result<EventArray> {
        if src_indices.len() != events.n_events() {
            return Err(Error::Validation(format!(
                "got {} source indices for {} events",
                src_indices.len(),
                events.n_events()
            )));
        }
        let true_ra = events.require_column("true_ra")?;
        let true_dec = events.require_column("true_dec")?;
        let ra = events.require_column("ra")?;
        let dec = events.require_column("dec")?;

        let n = events.n_events();
        let (mut new_ra, mut new_dec) = (Vec::with_capacity(n), Vec::with_capacity(n));
        let (mut new_true_ra, mut new_true_dec) = (Vec::with_capacity(n), Vec::with_capacity(n));
        for i in 0..n {
            let src = sources.get(src_indices[i]).ok_or_else(|| {
                Error::Validation(format!("source index {} out of range", src_indices[i]))
            })?;
            let (r, d) = rotate(true_ra[i], true_dec[i], src.ra(), src.dec(), ra[i], dec[i]);
            new_ra.push(r);
            new_dec.push(d);
            new_true_ra.push(src.ra());
            new_true_dec.push(src.dec());
        }
        events.set_column("ra", new_ra)?;
        events.set_column("dec", new_dec)?;
        events.set_column("true_ra", new_true_ra)?;
        events.set_column("true_dec", new_true_dec)?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::PowerLawFlux;
    use crate::math::angular_distance;
    use approx::assert_relative_eq;

    fn mc() -> EventArray {
        EventArray::from_columns(vec![
            ("ra".to_string(), vec![1.01, 2.0, 3.0]),
            ("dec".to_string(), vec![0.51, -0.3, 0.49]),
            ("true_ra".to_string(), vec![1.0, 2.0, 3.0]),
            ("true_dec".to_string(), vec![0.5, -0.3, 0.5]),
            ("true_energy".to_string(), vec![1e3, 1e3, 1e4]),
            ("mcweight".to_string(), vec![1.0, 1.0, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_candidates_in_band_weighted_by_flux() {
        let m = PointLikeSourceSignalGenerationMethod::default();
        let src = PointLikeSource::new(0.2, 0.5).unwrap();
        let flux = PowerLawFlux::new(1.0, 1e3, 2.0).unwrap();
        let c = m.signal_candidates(&mc(), &[src], &flux, 1.0).unwrap();
        assert_eq!(c.mc_indices, vec![0, 2]);
        assert_eq!(c.src_indices, vec![0, 0]);
        assert_relative_eq!(c.weights[0] / c.weights[1], 100.0, max_relative = 1e-12);
    }

    #[test]
    fn test_post_process_rotates_onto_source() {
        let m = PointLikeSourceSignalGenerationMethod::default();
        let src = PointLikeSource::new(4.0, -0.2).unwrap();
        let ev = mc().select(&[0]).unwrap();
        let before = angular_distance(1.0, 0.5, 1.01, 0.51);
        let out = m.post_process(ev, &[src], &[0]).unwrap();
        let ra = out.column("ra").unwrap()[0];
        let dec = out.column("dec").unwrap()[0];
        assert_relative_eq!(angular_distance(4.0, -0.2, ra, dec), before, epsilon = 1e-9);
        assert_eq!(out.column("true_dec").unwrap(), &[-0.2]);

        let ev = mc().select(&[0]).unwrap();
        assert!(m.post_process(ev, &[src], &[1]).is_err());
    }
}
