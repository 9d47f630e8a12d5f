//! Prior model kinds, per-quantity rules and weight evaluation.

use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::functions::{
    exponential, imf_flat, imf_kroupa, imf_salpeter, lognormal, two_lognormal,
};
use super::PriorError;
use crate::algo::quadrature::DEFAULT_REL_TOL;
use crate::algo::{adaptive_simpson, compute_bin_boundaries, interp_clamped, step_interp};

/// Years per Gyr, the unit of the age exponential `tau`
const YEARS_PER_GYR: f64 = 1e9;

/// A prior choice with its parameters.
///
/// Serialized as `{"name": "<kind>", ...parameters}`, e.g.
/// `{"name": "lognormal", "mean": 2.0, "sigma": 0.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum PriorSpec {
    /// Constant weight, `amp` or 1
    Flat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amp: Option<f64>,
    },
    /// Log-normal with its peak at `mean`
    Lognormal { mean: f64, sigma: f64 },
    /// Two log-normals, `N1_to_N2` times more of the first
    TwoLognormal {
        mean1: f64,
        mean2: f64,
        sigma1: f64,
        sigma2: f64,
        #[serde(rename = "N1_to_N2")]
        n1_to_n2: f64,
    },
    /// `exp(-x / tau)`; for age, `tau` is in Gyr and `x` is log age
    Exponential { tau: f64 },
    /// Step function over breakpoints `x`
    BinsHisto { x: Vec<f64>, values: Vec<f64> },
    /// Linear interpolation between control points, clamped at the ends
    BinsInterp { x: Vec<f64>, values: Vec<f64> },
    /// Flat in linear age for log-age samples
    FlatLog,
    Salpeter,
    Kroupa,
}

impl PriorSpec {
    pub fn kind(&self) -> PriorKind {
        match self {
            PriorSpec::Flat { .. } => PriorKind::Flat,
            PriorSpec::Lognormal { .. } => PriorKind::Lognormal,
            PriorSpec::TwoLognormal { .. } => PriorKind::TwoLognormal,
            PriorSpec::Exponential { .. } => PriorKind::Exponential,
            PriorSpec::BinsHisto { .. } => PriorKind::BinsHisto,
            PriorSpec::BinsInterp { .. } => PriorKind::BinsInterp,
            PriorSpec::FlatLog => PriorKind::FlatLog,
            PriorSpec::Salpeter => PriorKind::Salpeter,
            PriorSpec::Kroupa => PriorKind::Kroupa,
        }
    }

    /// Flat prior with unit amplitude
    pub fn flat() -> Self {
        PriorSpec::Flat { amp: None }
    }
}

/// Parameterless tag of a [`PriorSpec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorKind {
    Flat,
    Lognormal,
    TwoLognormal,
    Exponential,
    BinsHisto,
    BinsInterp,
    FlatLog,
    Salpeter,
    Kroupa,
}

impl PriorKind {
    /// Name used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            PriorKind::Flat => "flat",
            PriorKind::Lognormal => "lognormal",
            PriorKind::TwoLognormal => "two_lognormal",
            PriorKind::Exponential => "exponential",
            PriorKind::BinsHisto => "bins_histo",
            PriorKind::BinsInterp => "bins_interp",
            PriorKind::FlatLog => "flat_log",
            PriorKind::Salpeter => "salpeter",
            PriorKind::Kroupa => "kroupa",
        }
    }
}

impl fmt::Display for PriorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Evaluation hook: samples in, one weight per sample out.
pub type EvaluateFn = fn(&PriorSpec, ArrayView1<f64>) -> Result<Array1<f64>, PriorError>;

/// What a physical quantity allows and how it evaluates its priors
pub struct QuantityRules {
    /// Name used in error messages
    pub label: &'static str,
    pub allowed: &'static [PriorKind],
    pub evaluate: EvaluateFn,
}

impl fmt::Debug for QuantityRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantityRules")
            .field("label", &self.label)
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}

static DUST_RULES: QuantityRules = QuantityRules {
    label: "dust",
    allowed: &[
        PriorKind::Flat,
        PriorKind::Lognormal,
        PriorKind::TwoLognormal,
        PriorKind::Exponential,
    ],
    evaluate: evaluate_pointwise,
};

static AGE_RULES: QuantityRules = QuantityRules {
    label: "age",
    allowed: &[
        PriorKind::Flat,
        PriorKind::FlatLog,
        PriorKind::BinsHisto,
        PriorKind::BinsInterp,
        PriorKind::Exponential,
    ],
    evaluate: evaluate_age,
};

static MASS_RULES: QuantityRules = QuantityRules {
    label: "mass",
    allowed: &[PriorKind::Flat, PriorKind::Salpeter, PriorKind::Kroupa],
    evaluate: evaluate_mass,
};

static METALLICITY_RULES: QuantityRules = QuantityRules {
    label: "metallicity",
    allowed: &[PriorKind::Flat],
    evaluate: evaluate_pointwise,
};

static DISTANCE_RULES: QuantityRules = QuantityRules {
    label: "distance",
    allowed: &[PriorKind::Flat],
    evaluate: evaluate_pointwise,
};

/// Physical quantity a prior weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Dust,
    Age,
    Mass,
    Metallicity,
    Distance,
}

impl Quantity {
    pub fn rules(self) -> &'static QuantityRules {
        match self {
            Quantity::Dust => &DUST_RULES,
            Quantity::Age => &AGE_RULES,
            Quantity::Mass => &MASS_RULES,
            Quantity::Metallicity => &METALLICITY_RULES,
            Quantity::Distance => &DISTANCE_RULES,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rules().label)
    }
}

/// A validated prior, ready to weight samples of one quantity
#[derive(Debug, Clone)]
pub struct PriorModel {
    spec: PriorSpec,
    rules: &'static QuantityRules,
}

impl PriorModel {
    /// Validate `spec` against the allow-list of `quantity`.
    ///
    /// # Errors
    /// `PriorError::NotAllowed` when the kind is not allowed for the quantity
    pub fn new(spec: PriorSpec, quantity: Quantity) -> Result<Self, PriorError> {
        Self::with_rules(spec, quantity.rules())
    }

    /// Validate against custom rules
    pub fn with_rules(spec: PriorSpec, rules: &'static QuantityRules) -> Result<Self, PriorError> {
        let kind = spec.kind();
        if !rules.allowed.contains(&kind) {
            return Err(PriorError::NotAllowed {
                kind,
                quantity: rules.label,
            });
        }
        Ok(Self { spec, rules })
    }

    pub fn dust(spec: PriorSpec) -> Result<Self, PriorError> {
        Self::new(spec, Quantity::Dust)
    }

    pub fn age(spec: PriorSpec) -> Result<Self, PriorError> {
        Self::new(spec, Quantity::Age)
    }

    pub fn mass(spec: PriorSpec) -> Result<Self, PriorError> {
        Self::new(spec, Quantity::Mass)
    }

    pub fn metallicity(spec: PriorSpec) -> Result<Self, PriorError> {
        Self::new(spec, Quantity::Metallicity)
    }

    pub fn distance(spec: PriorSpec) -> Result<Self, PriorError> {
        Self::new(spec, Quantity::Distance)
    }

    pub fn spec(&self) -> &PriorSpec {
        &self.spec
    }

    pub fn kind(&self) -> PriorKind {
        self.spec.kind()
    }

    /// Label of the quantity this prior was validated for
    pub fn quantity(&self) -> &'static str {
        self.rules.label
    }

    /// Weight every sample.
    ///
    /// # Arguments
    /// * `x` - Samples in any order, duplicates allowed; never modified
    ///
    /// # Returns
    /// One non-negative weight per sample, in input order. Empty input
    /// gives an empty result.
    pub fn weights(&self, x: ArrayView1<f64>) -> Result<Array1<f64>, PriorError> {
        if x.is_empty() {
            return Ok(Array1::zeros(0));
        }
        (self.rules.evaluate)(&self.spec, x)
    }
}

/// Direct density evaluation shared by every quantity
fn evaluate_pointwise(spec: &PriorSpec, x: ArrayView1<f64>) -> Result<Array1<f64>, PriorError> {
    match spec {
        PriorSpec::Flat { amp } => Ok(Array1::from_elem(x.len(), amp.unwrap_or(1.0))),
        PriorSpec::Lognormal { mean, sigma } => Ok(x.mapv(|v| lognormal(v, *mean, *sigma, 1.0))),
        PriorSpec::TwoLognormal {
            mean1,
            mean2,
            sigma1,
            sigma2,
            n1_to_n2,
        } => Ok(x.mapv(|v| two_lognormal(v, *mean1, *mean2, *sigma1, *sigma2, *n1_to_n2))),
        PriorSpec::Exponential { tau } => Ok(x.mapv(|v| exponential(v, *tau))),
        PriorSpec::BinsHisto { x: edges, values } => bins_histo(x, edges, values),
        PriorSpec::BinsInterp { x: points, values } => bins_interp(x, points, values),
        PriorSpec::FlatLog | PriorSpec::Salpeter | PriorSpec::Kroupa => {
            Err(PriorError::Unsupported(spec.kind()))
        }
    }
}

fn evaluate_age(spec: &PriorSpec, x: ArrayView1<f64>) -> Result<Array1<f64>, PriorError> {
    match spec {
        PriorSpec::FlatLog => flat_log_weights(x),
        PriorSpec::Exponential { tau } => {
            let tau_years = tau * YEARS_PER_GYR;
            Ok(x.mapv(|log_age| exponential(10f64.powf(log_age), tau_years)))
        }
        _ => evaluate_pointwise(spec, x),
    }
}

fn evaluate_mass(spec: &PriorSpec, x: ArrayView1<f64>) -> Result<Array1<f64>, PriorError> {
    let imf: fn(f64) -> f64 = match spec {
        PriorSpec::Flat { .. } => imf_flat,
        PriorSpec::Salpeter => imf_salpeter,
        PriorSpec::Kroupa => imf_kroupa,
        _ => return Err(PriorError::Unsupported(spec.kind())),
    };
    mass_weights(x, imf)
}

fn bins_histo(
    x: ArrayView1<f64>,
    edges: &[f64],
    values: &[f64],
) -> Result<Array1<f64>, PriorError> {
    let mut heights = values.to_vec();
    if values.len() + 1 == edges.len() {
        heights.push(0.0);
    } else if values.len() != edges.len() {
        return Err(PriorError::LengthMismatch {
            x: edges.len(),
            values: values.len(),
        });
    }

    if let (Some(&lo), Some(&hi)) = (edges.first(), edges.last()) {
        if let Some(&value) = x.iter().find(|&&v| !(lo..=hi).contains(&v)) {
            return Err(PriorError::BinsOutOfRange { value, lo, hi });
        }
    }

    Ok(x.iter()
        .map(|&v| step_interp(v, edges, &heights))
        .collect::<Result<Array1<f64>, _>>()?)
}

fn bins_interp(
    x: ArrayView1<f64>,
    points: &[f64],
    values: &[f64],
) -> Result<Array1<f64>, PriorError> {
    if points.len() != values.len() {
        return Err(PriorError::LengthMismatch {
            x: points.len(),
            values: values.len(),
        });
    }
    Ok(x.iter()
        .map(|&v| interp_clamped(v, points, values))
        .collect::<Result<Array1<f64>, _>>()?)
}

/// Weights flat in linear age for log-age samples, summing to 1.
fn flat_log_weights(x: ArrayView1<f64>) -> Result<Array1<f64>, PriorError> {
    if x.len() == 1 {
        return Ok(Array1::ones(1));
    }
    let bounds = compute_bin_boundaries(x)?.mapv(|b| 10f64.powf(b));
    let weights: Array1<f64> = bounds
        .windows(2)
        .into_iter()
        .map(|w| 1.0 / (w[1] - w[0]))
        .collect();
    let total = weights.sum();
    if !total.is_finite() || total == 0.0 {
        return Err(PriorError::NonFinite(format!(
            "flat_log weights sum to {total}"
        )));
    }
    Ok(weights / total)
}

/// Average IMF over each sample's mass bin, normalized to mean 1.
fn mass_weights(x: ArrayView1<f64>, imf: fn(f64) -> f64) -> Result<Array1<f64>, PriorError> {
    let n = x.len();
    if n == 1 {
        return Ok(Array1::ones(1));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let sorted: Array1<f64> = order.iter().map(|&i| x[i]).collect();
    let bounds = compute_bin_boundaries(sorted.view())?;

    let mut weights = Array1::zeros(n);
    for (i, &idx) in order.iter().enumerate() {
        let (lo, hi) = (bounds[i], bounds[i + 1]);
        let width = hi - lo;
        weights[idx] = if width > 0.0 {
            adaptive_simpson(imf, lo, hi, DEFAULT_REL_TOL) / width
        } else {
            imf(lo)
        };
    }

    if let Some(bad) = weights.iter().position(|w: &f64| !w.is_finite()) {
        return Err(PriorError::NonFinite(format!(
            "mass weight for M = {} is {}",
            x[bad], weights[bad]
        )));
    }
    let mean = weights.mean().unwrap_or(0.0);
    if mean <= 0.0 {
        return Err(PriorError::NonFinite(format!("mean mass weight is {mean}")));
    }
    Ok(weights / mean)
}
