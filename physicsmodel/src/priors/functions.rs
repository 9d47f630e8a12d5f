//! Closed-form prior densities and initial mass functions.
//!
//! All functions are pointwise and unnormalized unless stated otherwise.

use std::f64::consts::PI;

/// Lower break of the Kroupa IMF in solar masses
pub const KROUPA_M1: f64 = 0.08;
/// Upper break of the Kroupa IMF in solar masses
pub const KROUPA_M2: f64 = 0.5;
const KROUPA_ALPHA0: f64 = -0.3;
const KROUPA_ALPHA1: f64 = -1.3;
const KROUPA_ALPHA2: f64 = -2.3;

/// Salpeter (1955) power-law slope
pub const SALPETER_ALPHA: f64 = -2.35;

/// Log-normal density with its peak at `max_pos`.
///
/// # Arguments
/// * `x` - Evaluation point; non-positive values give 0
/// * `max_pos` - Position of the maximum of the density
/// * `sigma` - Width in natural-log units
/// * `n` - Amplitude
///
/// # Returns
/// `n / (x sigma sqrt(2 pi)) * exp(-0.5 ((ln x - mu) / sigma)^2)` with
/// `mu = ln(max_pos) + sigma^2`.
pub fn lognormal(x: f64, max_pos: f64, sigma: f64, n: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let mu = max_pos.ln() + sigma * sigma;
    let z = (x.ln() - mu) / sigma;
    n / (x * sigma * (2.0 * PI).sqrt()) * (-0.5 * z * z).exp()
}

/// Mixture of two log-normals, `n1_to_n2` times more of the first.
///
/// The mixture is divided by `n1_to_n2 + 1` so it has the amplitude of a
/// single unit log-normal.
pub fn two_lognormal(
    x: f64,
    max_pos1: f64,
    max_pos2: f64,
    sigma1: f64,
    sigma2: f64,
    n1_to_n2: f64,
) -> f64 {
    let first = lognormal(x, max_pos1, sigma1, n1_to_n2);
    let second = lognormal(x, max_pos2, sigma2, 1.0);
    (first + second) / (n1_to_n2 + 1.0)
}

/// Exponential decay `exp(-x / tau)`.
pub fn exponential(x: f64, tau: f64) -> f64 {
    (-x / tau).exp()
}

/// Constant IMF
pub fn imf_flat(_mass: f64) -> f64 {
    1.0
}

/// Salpeter IMF, `m^-2.35`
pub fn imf_salpeter(mass: f64) -> f64 {
    mass.powf(SALPETER_ALPHA)
}

/// Kroupa (2001) broken power-law IMF.
///
/// Slopes of -0.3 below 0.08 Msun, -1.3 up to 0.5 Msun and -2.3 above,
/// scaled so the segments join continuously.
pub fn imf_kroupa(mass: f64) -> f64 {
    let fac1 = KROUPA_M1.powf(KROUPA_ALPHA0 - KROUPA_ALPHA1);
    let fac2 = fac1 * KROUPA_M2.powf(KROUPA_ALPHA1 - KROUPA_ALPHA2);

    if mass < KROUPA_M1 {
        mass.powf(KROUPA_ALPHA0)
    } else if mass < KROUPA_M2 {
        fac1 * mass.powf(KROUPA_ALPHA1)
    } else {
        fac2 * mass.powf(KROUPA_ALPHA2)
    }
}
