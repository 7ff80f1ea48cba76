//! Differential flux models `dN/dE` in GeV⁻¹ cm⁻² s⁻¹.

use sky_core::{Error, Result};
use std::fmt;

/// A differential particle flux as a function of energy (GeV).
pub trait FluxModel: Send + Sync + fmt::Debug {
    /// Flux at `energy` (GeV).
    fn flux(&self, energy: f64) -> f64;

    /// Human-readable formula.
    fn math_function_str(&self) -> String;

    /// Power-law view, for yield implementations restricted to power laws.
    fn as_power_law(&self) -> Option<&PowerLawFlux> {
        None
    }
}

fn check_positive(what: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(Error::Validation(format!("{what} must be positive and finite, got {v}")));
    }
    Ok(())
}

fn check_finite(what: &str, v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(Error::Validation(format!("{what} must be finite, got {v}")));
    }
    Ok(())
}

/// `Φ0 (E/E0)^-γ`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawFlux {
    phi0: f64,
    e0: f64,
    gamma: f64,
}

impl PowerLawFlux {
    /// Create a power law with normalization `phi0` at reference energy `e0` (GeV).
    pub fn new(phi0: f64, e0: f64, gamma: f64) -> Result<Self> {
        check_positive("power law phi0", phi0)?;
        check_positive("power law E0", e0)?;
        check_finite("power law gamma", gamma)?;
        Ok(Self { phi0, e0, gamma })
    }

    /// Normalization.
    pub fn phi0(&self) -> f64 {
        self.phi0
    }

    /// Reference energy in GeV.
    pub fn e0(&self) -> f64 {
        self.e0
    }

    /// Spectral index.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Copy with a different spectral index.
    pub fn with_gamma(&self, gamma: f64) -> Result<Self> {
        Self::new(self.phi0, self.e0, gamma)
    }
}

impl FluxModel for PowerLawFlux {
    fn flux(&self, energy: f64) -> f64 {
        self.phi0 * (energy / self.e0).powf(-self.gamma)
    }

    fn math_function_str(&self) -> String {
        format!("dN/dE = {:e} * (E / {:e} GeV)^-{}", self.phi0, self.e0, self.gamma)
    }

    fn as_power_law(&self) -> Option<&PowerLawFlux> {
        Some(self)
    }
}

/// `Φ0 (E/E0)^-γ exp(-E/E_cut)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoffPowerLawFlux {
    power_law: PowerLawFlux,
    e_cut: f64,
}

impl CutoffPowerLawFlux {
    /// Create a power law with an exponential cutoff at `e_cut` (GeV).
    pub fn new(phi0: f64, e0: f64, gamma: f64, e_cut: f64) -> Result<Self> {
        check_positive("cutoff energy", e_cut)?;
        Ok(Self { power_law: PowerLawFlux::new(phi0, e0, gamma)?, e_cut })
    }

    /// Cutoff energy in GeV.
    pub fn e_cut(&self) -> f64 {
        self.e_cut
    }
}

impl FluxModel for CutoffPowerLawFlux {
    fn flux(&self, energy: f64) -> f64 {
        self.power_law.flux(energy) * (-energy / self.e_cut).exp()
    }

    fn math_function_str(&self) -> String {
        format!("{} * exp(-E / {:e} GeV)", self.power_law.math_function_str(), self.e_cut)
    }
}

/// `Φ0 (E/E0)^-(α + β ln(E/E0))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogParabolaPowerLawFlux {
    phi0: f64,
    e0: f64,
    alpha: f64,
    beta: f64,
}

impl LogParabolaPowerLawFlux {
    /// Create a log-parabola spectrum.
    pub fn new(phi0: f64, e0: f64, alpha: f64, beta: f64) -> Result<Self> {
        check_positive("log-parabola phi0", phi0)?;
        check_positive("log-parabola E0", e0)?;
        check_finite("log-parabola alpha", alpha)?;
        check_finite("log-parabola beta", beta)?;
        Ok(Self { phi0, e0, alpha, beta })
    }
}

impl FluxModel for LogParabolaPowerLawFlux {
    fn flux(&self, energy: f64) -> f64 {
        let x = energy / self.e0;
        self.phi0 * x.powf(-(self.alpha + self.beta * x.ln()))
    }

    fn math_function_str(&self) -> String {
        format!(
            "dN/dE = {:e} * (E / {:e} GeV)^(-({} + {} * ln(E / {:e} GeV)))",
            self.phi0, self.e0, self.alpha, self.beta, self.e0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_power_law_value() {
        let f = PowerLawFlux::new(1e-18, 1e3, 2.0).unwrap();
        assert_relative_eq!(f.flux(1e3), 1e-18);
        assert_relative_eq!(f.flux(1e4), 1e-20, max_relative = 1e-12);
        assert!(f.as_power_law().is_some());
        assert!(f.math_function_str().contains("^-2"));
    }

    #[test]
    fn test_cutoff_and_log_parabola() {
        let c = CutoffPowerLawFlux::new(1.0, 1.0, 2.0, 10.0).unwrap();
        assert_relative_eq!(c.flux(10.0), 0.01 * (-1.0f64).exp(), max_relative = 1e-12);
        assert!(c.as_power_law().is_none());

        let lp = LogParabolaPowerLawFlux::new(1.0, 1.0, 2.0, 0.0).unwrap();
        assert_relative_eq!(lp.flux(10.0), 0.01, max_relative = 1e-12);
    }

    #[test]
    fn test_validation() {
        assert!(PowerLawFlux::new(0.0, 1.0, 2.0).is_err());
        assert!(PowerLawFlux::new(1.0, -1.0, 2.0).is_err());
        assert!(CutoffPowerLawFlux::new(1.0, 1.0, 2.0, f64::NAN).is_err());
    }
}
