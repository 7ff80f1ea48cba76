//! Spherical geometry and numerically safe logarithms.

use std::f64::consts::{PI, TAU};

/// Smallest argument `α` for which `ln(1 + α)` is evaluated exactly.
pub(crate) const ALPHA_TAYLOR_THRESHOLD: f64 = -1.0 + 1e-3;

/// `ln(1 + α)` and its derivative, continued by a second-order Taylor expansion
/// around [`ALPHA_TAYLOR_THRESHOLD`] for smaller `α`.
pub fn log1p_continued(alpha: f64) -> (f64, f64) {
    if alpha >= ALPHA_TAYLOR_THRESHOLD {
        return (alpha.ln_1p(), 1.0 / (1.0 + alpha));
    }
    let a0 = 1.0 + ALPHA_TAYLOR_THRESHOLD;
    let d = alpha - ALPHA_TAYLOR_THRESHOLD;
    let value = a0.ln() + d / a0 - d * d / (2.0 * a0 * a0);
    let deriv = 1.0 / a0 - d / (a0 * a0);
    (value, deriv)
}

/// Great-circle distance between two points (radians).
pub fn angular_distance(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let sd = ((dec2 - dec1) * 0.5).sin();
    let sr = ((ra2 - ra1) * 0.5).sin();
    let h = sd * sd + dec1.cos() * dec2.cos() * sr * sr;
    2.0 * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Wrap a right ascension into `[0, 2π)`.
pub fn wrap_ra(ra: f64) -> f64 {
    let r = ra.rem_euclid(TAU);
    if r >= TAU { 0.0 } else { r }
}

fn to_vec(ra: f64, dec: f64) -> [f64; 3] {
    [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
}

fn to_radec(v: [f64; 3]) -> (f64, f64) {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    let z = (v[2] / norm).clamp(-1.0, 1.0);
    (wrap_ra(v[1].atan2(v[0])), z.asin())
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Rotate `(ra, dec)` by the rotation that carries `(from_ra, from_dec)` onto
/// `(to_ra, to_dec)` along their great circle.
///
/// Used to move a Monte-Carlo event whose true direction is `from` onto a source at `to`,
/// keeping the reconstructed direction's offset from the true direction.
pub fn rotate(from_ra: f64, from_dec: f64, to_ra: f64, to_dec: f64, ra: f64, dec: f64) -> (f64, f64) {
    let a = to_vec(from_ra, from_dec);
    let b = to_vec(to_ra, to_dec);
    let v = to_vec(ra, dec);

    let cos_t = dot(a, b).clamp(-1.0, 1.0);
    let axis = cross(a, b);
    let sin_t = dot(axis, axis).sqrt();

    if sin_t < 1e-12 {
        if cos_t > 0.0 {
            return (wrap_ra(ra), dec);
        }
        // Antipodal: rotate by π around any axis perpendicular to `a`.
        let helper = if a[2].abs() < 0.9 { [0.0, 0.0, 1.0] } else { [1.0, 0.0, 0.0] };
        let perp = cross(a, helper);
        let n = dot(perp, perp).sqrt();
        let k = [perp[0] / n, perp[1] / n, perp[2] / n];
        return to_radec(rodrigues(v, k, -1.0, 0.0));
    }

    let k = [axis[0] / sin_t, axis[1] / sin_t, axis[2] / sin_t];
    to_radec(rodrigues(v, k, cos_t, sin_t))
}

fn rodrigues(v: [f64; 3], k: [f64; 3], cos_t: f64, sin_t: f64) -> [f64; 3] {
    let kxv = cross(k, v);
    let kdv = dot(k, v);
    [
        v[0] * cos_t + kxv[0] * sin_t + k[0] * kdv * (1.0 - cos_t),
        v[1] * cos_t + kxv[1] * sin_t + k[1] * kdv * (1.0 - cos_t),
        v[2] * cos_t + kxv[2] * sin_t + k[2] * kdv * (1.0 - cos_t),
    ]
}

/// Solid angle of the declination band `[sin_lo, sin_hi]` over the full RA range.
pub fn band_solid_angle(sin_lo: f64, sin_hi: f64) -> f64 {
    2.0 * PI * (sin_hi - sin_lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log1p_continued_is_smooth() {
        let (v, d) = log1p_continued(0.5);
        assert_relative_eq!(v, 1.5f64.ln());
        assert_relative_eq!(d, 1.0 / 1.5);

        let eps = 1e-9;
        let (vl, _) = log1p_continued(ALPHA_TAYLOR_THRESHOLD - eps);
        let (vr, _) = log1p_continued(ALPHA_TAYLOR_THRESHOLD + eps);
        assert_relative_eq!(vl, vr, epsilon = 1e-5);

        let (v, d) = log1p_continued(-1.5);
        assert!(v.is_finite() && d.is_finite());
    }

    #[test]
    fn test_angular_distance() {
        assert_relative_eq!(angular_distance(0.0, 0.0, PI / 2.0, 0.0), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(angular_distance(1.0, PI / 2.0, 2.0, PI / 2.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(angular_distance(0.3, -0.2, 0.3, 0.4), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_moves_true_direction_onto_target() {
        let (ra, dec) = rotate(1.0, 0.2, 4.0, -0.7, 1.0, 0.2);
        assert_relative_eq!(ra, 4.0, epsilon = 1e-9);
        assert_relative_eq!(dec, -0.7, epsilon = 1e-9);

        // Offsets from the true direction are preserved.
        let psi = angular_distance(1.0, 0.2, 1.05, 0.23);
        let (ra2, dec2) = rotate(1.0, 0.2, 4.0, -0.7, 1.05, 0.23);
        assert_relative_eq!(angular_distance(4.0, -0.7, ra2, dec2), psi, epsilon = 1e-9);
    }

    #[test]
    fn test_rotate_antipodal() {
        let (ra, dec) = rotate(0.0, 0.0, PI, 0.0, 0.0, 0.0);
        assert_relative_eq!(angular_distance(ra, dec, PI, 0.0), 0.0, epsilon = 1e-9);
    }
}
