//! Numerical building blocks shared by the prior models.
//!
//! - **Bin boundaries**: midpoint-rule edges around irregular 1-D samples
//! - **Interpolation**: clamped linear and zero-order (step) lookups
//! - **Quadrature**: adaptive Simpson integration of smooth or kinked densities

pub mod bins;
pub mod interp;
pub mod quadrature;

pub use bins::{compute_bin_boundaries, BinError};
pub use interp::{interp_clamped, step_interp, InterpError};
pub use quadrature::adaptive_simpson;
