//! One-dimensional table lookups used by the tabulated priors.
//!
//! Both lookups locate the bracketing interval with a binary search over the
//! control abscissae, so repeated evaluation over a full grid column is
//! O(n log m).

use thiserror::Error;

/// Errors that can occur while validating interpolation tables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Interpolation table needs at least {0} control points")]
    InsufficientData(usize),
    #[error("Control vectors must have the same length ({0} x values, {1} values)")]
    MismatchedLengths(usize, usize),
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
}

fn check_table(xs: &[f64], ys: &[f64], min_points: usize) -> Result<(), InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths(xs.len(), ys.len()));
    }
    if xs.len() < min_points {
        return Err(InterpError::InsufficientData(min_points));
    }
    if xs.windows(2).any(|w| w[1] < w[0]) {
        return Err(InterpError::UnsortedData);
    }
    Ok(())
}

/// Index of the last control point that is <= x (x must be >= xs[0]).
fn lower_index(x: f64, xs: &[f64]) -> usize {
    xs.partition_point(|&edge| edge <= x).saturating_sub(1)
}

/// Piecewise-linear interpolation clamped to the end values.
///
/// Below `xs[0]` the result is `ys[0]`, above the last control point it is
/// the last value; nothing is extrapolated.
///
/// # Arguments
/// * `x` - Position to evaluate
/// * `xs` - Control abscissae, ascending
/// * `ys` - Control values, same length as `xs`
///
/// # Errors
/// * `InterpError::MismatchedLengths` - xs and ys differ in length
/// * `InterpError::InsufficientData` - empty table
/// * `InterpError::UnsortedData` - xs not ascending
pub fn interp_clamped(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    check_table(xs, ys, 1)?;

    let last = xs.len() - 1;
    if x <= xs[0] {
        return Ok(ys[0]);
    }
    if x >= xs[last] {
        return Ok(ys[last]);
    }

    let i1 = lower_index(x, xs);
    let i2 = i1 + 1;

    let (x1, x2) = (xs[i1], xs[i2]);
    let (y1, y2) = (ys[i1], ys[i2]);
    if x2 == x1 {
        return Ok(y2);
    }

    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// Zero-order ("previous value") interpolation.
///
/// Returns `ys[i]` for `xs[i] <= x < xs[i + 1]`. The last interval is
/// closed, so at the last control point `ys[last - 1]` applies and
/// `ys[last]` is never returned. Positions outside `[xs[0], xs[last]]` are
/// an error rather than an extrapolation.
pub fn step_interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    check_table(xs, ys, 2)?;

    let last = xs.len() - 1;
    if x < xs[0] || x > xs[last] || x.is_nan() {
        return Err(InterpError::OutOfBounds(x, xs[0], xs[last]));
    }
    if x == xs[last] {
        return Ok(ys[last - 1]);
    }

    Ok(ys[lower_index(x, xs)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interp_clamped_inside() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [0.0, 10.0, 0.0];

        assert_relative_eq!(interp_clamped(1.5, &xs, &ys).unwrap(), 5.0);
        assert_relative_eq!(interp_clamped(2.0, &xs, &ys).unwrap(), 10.0);
        assert_relative_eq!(interp_clamped(2.75, &xs, &ys).unwrap(), 2.5);
    }

    #[test]
    fn test_interp_clamped_outside_uses_end_values() {
        let xs = [1.0, 2.0];
        let ys = [3.0, 7.0];

        assert_eq!(interp_clamped(-10.0, &xs, &ys).unwrap(), 3.0);
        assert_eq!(interp_clamped(50.0, &xs, &ys).unwrap(), 7.0);
    }

    #[test]
    fn test_interp_clamped_single_point() {
        assert_eq!(interp_clamped(4.0, &[2.0], &[9.0]).unwrap(), 9.0);
    }

    #[test]
    fn test_interp_clamped_errors() {
        assert_eq!(
            interp_clamped(1.0, &[1.0, 2.0], &[1.0]),
            Err(InterpError::MismatchedLengths(2, 1))
        );
        assert_eq!(
            interp_clamped(1.0, &[], &[]),
            Err(InterpError::InsufficientData(1))
        );
        assert_eq!(
            interp_clamped(1.0, &[2.0, 1.0], &[0.0, 1.0]),
            Err(InterpError::UnsortedData)
        );
    }

    #[test]
    fn test_step_interp() {
        let xs = [6.0, 7.0, 8.0, 9.0];
        let ys = [1.0, 2.0, 3.0, 0.0];

        assert_eq!(step_interp(6.0, &xs, &ys).unwrap(), 1.0);
        assert_eq!(step_interp(6.99, &xs, &ys).unwrap(), 1.0);
        assert_eq!(step_interp(7.0, &xs, &ys).unwrap(), 2.0);
        assert_eq!(step_interp(8.5, &xs, &ys).unwrap(), 3.0);
        assert_eq!(step_interp(8.99, &xs, &ys).unwrap(), 3.0);
    }

    #[test]
    fn test_step_interp_last_breakpoint_closes_last_interval() {
        let xs = [6.0, 7.0, 8.0, 9.0];
        let ys = [1.0, 2.0, 3.0, 0.0];
        assert_eq!(step_interp(9.0, &xs, &ys).unwrap(), 3.0);
        assert_eq!(step_interp(7.0, &[6.0, 7.0], &[4.0, 5.0]).unwrap(), 4.0);
    }

    #[test]
    fn test_step_interp_out_of_bounds() {
        let xs = [6.0, 7.0];
        let ys = [1.0, 0.0];

        assert_eq!(
            step_interp(5.5, &xs, &ys),
            Err(InterpError::OutOfBounds(5.5, 6.0, 7.0))
        );
        assert!(step_interp(7.5, &xs, &ys).is_err());
    }
}
