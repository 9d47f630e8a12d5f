//! Bin edges for point-sampled grids.
//!
//! Model grids sample age and mass at irregular positions. To turn a point
//! sample into a bin-integrated quantity each sample needs a bin: interior
//! edges sit halfway between neighbouring samples and the two outer edges
//! mirror the adjacent half-width outward.

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

/// Errors from bin-edge construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BinError {
    #[error("At least 2 samples are needed to derive bin boundaries, got {0}")]
    TooFewSamples(usize),
}

/// Compute the n+1 bin boundaries around n samples.
///
/// Samples are taken in the order given: ascending input yields ascending
/// edges and descending input yields descending edges. Spacing may be
/// irregular; only neighbouring samples are used for each edge.
///
/// # Arguments
/// * `samples` - Sample positions, at least two of them
///
/// # Returns
/// * `Ok(Array1<f64>)` - `samples.len() + 1` edges
/// * `Err(BinError::TooFewSamples)` - fewer than two samples
///
/// # Example
/// ```
/// use ndarray::array;
/// use physicsmodel::algo::compute_bin_boundaries;
///
/// let edges = compute_bin_boundaries(array![1.0, 2.0, 4.0].view()).unwrap();
/// assert_eq!(edges, array![0.5, 1.5, 3.0, 5.0]);
/// ```
pub fn compute_bin_boundaries(samples: ArrayView1<f64>) -> Result<Array1<f64>, BinError> {
    let n = samples.len();
    if n < 2 {
        return Err(BinError::TooFewSamples(n));
    }

    let mut edges = Array1::zeros(n + 1);
    for i in 1..n {
        edges[i] = 0.5 * (samples[i - 1] + samples[i]);
    }
    edges[0] = samples[0] - 0.5 * (samples[1] - samples[0]);
    edges[n] = samples[n - 1] + 0.5 * (samples[n - 1] - samples[n - 2]);

    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_uniform_spacing() {
        let edges = compute_bin_boundaries(array![1.0, 2.0, 3.0, 4.0].view()).unwrap();
        assert_eq!(edges, array![0.5, 1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_irregular_spacing() {
        let samples = array![6.0, 6.1, 6.5, 7.5, 9.0];
        let edges = compute_bin_boundaries(samples.view()).unwrap();

        assert_eq!(edges.len(), samples.len() + 1);
        assert_relative_eq!(edges[0], 5.95, epsilon = 1e-12);
        assert_relative_eq!(edges[1], 6.05, epsilon = 1e-12);
        assert_relative_eq!(edges[2], 6.3, epsilon = 1e-12);
        assert_relative_eq!(edges[3], 7.0, epsilon = 1e-12);
        assert_relative_eq!(edges[4], 8.25, epsilon = 1e-12);
        assert_relative_eq!(edges[5], 9.75, epsilon = 1e-12);
    }

    #[test]
    fn test_every_sample_inside_its_bin() {
        let samples = array![0.1, 0.15, 0.4, 0.45, 2.0, 8.0, 8.5];
        let edges = compute_bin_boundaries(samples.view()).unwrap();

        for (i, &s) in samples.iter().enumerate() {
            assert!(edges[i] < s && s < edges[i + 1], "sample {s} outside bin {i}");
        }
    }

    #[test]
    fn test_descending_input_gives_descending_edges() {
        let edges = compute_bin_boundaries(array![4.0, 2.0, 1.0].view()).unwrap();
        assert_eq!(edges, array![5.0, 3.0, 1.5, 0.5]);
        assert!(edges.windows(2).into_iter().all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_two_samples() {
        let edges = compute_bin_boundaries(array![10.0, 20.0].view()).unwrap();
        assert_eq!(edges, array![5.0, 15.0, 25.0]);
    }

    #[test]
    fn test_too_few_samples() {
        assert_eq!(
            compute_bin_boundaries(array![1.0].view()),
            Err(BinError::TooFewSamples(1))
        );
        let empty: Array1<f64> = Array1::zeros(0);
        assert_eq!(
            compute_bin_boundaries(empty.view()),
            Err(BinError::TooFewSamples(0))
        );
    }
}
