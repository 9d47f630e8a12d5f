//! Model grids and prior weights for Bayesian stellar SED fitting
//!
//! This crate stores grids of synthetic spectral energy distributions
//! together with the physical parameters that produced them, and converts
//! those parameters (age, mass, metallicity, distance, dust) into prior
//! weights for the fit.

pub mod algo;
pub mod grid;
pub mod io;
pub mod priors;
pub mod weights;

// Re-exports for easier access
pub use algo::compute_bin_boundaries;
pub use grid::{
    BackendKind, CacheBackend, Column, DiskBackend, GridBackend, GridError, MemoryBackend,
    ParamTable,
};
pub use priors::{PriorConfig, PriorModel, PriorSpec, Quantity};
pub use weights::{apply_prior, apply_prior_config, multiply_weights, WeightError};
