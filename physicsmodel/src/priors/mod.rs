//! Prior weights for grid parameters.
//!
//! A prior is chosen per physical quantity (dust, age, mass, metallicity,
//! distance) from a closed set of kinds, each with its own parameters. The
//! quantity restricts which kinds are allowed and how they are evaluated:
//! most kinds are simple pointwise densities, age adds the `flat_log` and
//! log-age exponential forms, and mass integrates an IMF over the bin of
//! each sample.
//!
//! ```
//! use ndarray::array;
//! use physicsmodel::priors::{PriorModel, PriorSpec, Quantity};
//!
//! let spec = PriorSpec::BinsInterp {
//!     x: vec![1.0, 2.0, 3.0],
//!     values: vec![0.0, 10.0, 0.0],
//! };
//! let model = PriorModel::new(spec, Quantity::Age).unwrap();
//! let weights = model.weights(array![1.0, 1.5, 2.0].view()).unwrap();
//! assert_eq!(weights, array![0.0, 5.0, 10.0]);
//! ```

pub mod config;
pub mod functions;
pub mod model;

use thiserror::Error;

use crate::algo::{BinError, InterpError};

pub use config::{ColumnNames, ConfigError, PriorConfig};
pub use model::{PriorKind, PriorModel, PriorSpec, Quantity, QuantityRules};

/// Errors from prior construction and evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriorError {
    #[error("{kind} is not an allowed model for {quantity}")]
    NotAllowed {
        kind: PriorKind,
        quantity: &'static str,
    },
    #[error("{0} has no pointwise form and needs a quantity-specific evaluation")]
    Unsupported(PriorKind),
    #[error("bins_histo requested bins outside of model range: {value} not in [{lo}, {hi}]")]
    BinsOutOfRange { value: f64, lo: f64, hi: f64 },
    #[error("Prior has {x} breakpoints but {values} values")]
    LengthMismatch { x: usize, values: usize },
    #[error("Prior table error: {0}")]
    Interp(#[from] InterpError),
    #[error("Bin boundary error: {0}")]
    Bins(#[from] BinError),
    #[error("Non-finite prior weight: {0}")]
    NonFinite(String),
}
