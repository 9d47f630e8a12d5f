//! Test helpers for physicsmodel
//!
//! Locates the workspace `test_output/` directory for grid files worth
//! keeping after a run, and builds small synthetic model grids as plain
//! arrays so tests do not need any grid file on disk.

use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array1, Array2};

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find workspace root: {0}")]
    WorkspaceRootNotFound(String),
}

/// Walk up from the current directory to the `Cargo.toml` that declares
/// `[workspace]`.
pub fn find_workspace_root() -> Result<PathBuf, TestHelperError> {
    let mut dir = env::current_dir().map_err(|e| {
        TestHelperError::WorkspaceRootNotFound(format!("no current directory: {e}"))
    })?;

    loop {
        let manifest = dir.join("Cargo.toml");
        if manifest.exists() {
            let content = std::fs::read_to_string(&manifest).map_err(|e| {
                TestHelperError::WorkspaceRootNotFound(format!(
                    "cannot read {}: {e}",
                    manifest.display()
                ))
            })?;
            if content.contains("[workspace]") {
                return Ok(dir);
            }
        }
        if !dir.pop() {
            break;
        }
    }

    Err(TestHelperError::WorkspaceRootNotFound(
        "no Cargo.toml with [workspace] above the current directory".to_string(),
    ))
}

static WORKSPACE_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_workspace_root().expect("Failed to find workspace root directory"));

static NEXT_FILE: AtomicUsize = AtomicUsize::new(0);

/// `test_output/` under the workspace root, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = WORKSPACE_ROOT.join("test_output");
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }
    output_dir
}

/// Path inside `test_output/`
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Path inside `test_output/` that no other test in this process uses.
///
/// # Arguments
/// * `stem` - Leading part of the file name
/// * `extension` - Grid file extension, e.g. `"fits"` or `"hdf5"`
pub fn unique_output_path(stem: &str, extension: &str) -> PathBuf {
    let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    output_path(format!("{stem}_{}_{n}.{extension}", std::process::id()))
}

/// Log-spaced band centres from 1000 to 20000 Angstrom.
pub fn synthetic_lamb(nbands: usize) -> Array1<f64> {
    Array1::logspace(10.0, 3.0, 20000f64.log10(), nbands)
}

/// Power-law SEDs, one row per model, with slopes spread over [-3, 1].
///
/// Each row is scaled by its model index so rows are easy to tell apart
/// after subsetting or reordering.
pub fn synthetic_seds(nmodels: usize, lamb: &Array1<f64>) -> Array2<f64> {
    let lamb_ref = lamb.get(0).copied().unwrap_or(1.0);
    Array2::from_shape_fn((nmodels, lamb.len()), |(model, band)| {
        let slope = if nmodels > 1 {
            -3.0 + 4.0 * model as f64 / (nmodels - 1) as f64
        } else {
            -1.0
        };
        (model + 1) as f64 * (lamb[band] / lamb_ref).powf(slope)
    })
}

/// Parameter columns of a regular age x mass x metallicity grid.
///
/// Returns `(logA, M_ini, Z)` with one entry per model; mass varies
/// fastest, so each run of `masses.len()` rows is one isochrone.
pub fn isochrone_columns(
    log_ages: &[f64],
    masses: &[f64],
    metallicities: &[f64],
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let n = log_ages.len() * masses.len() * metallicities.len();
    let mut ages = Vec::with_capacity(n);
    let mut mass = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);
    for &met in metallicities {
        for &age in log_ages {
            for &m in masses {
                ages.push(age);
                mass.push(m);
                z.push(met);
            }
        }
    }
    (Array1::from(ages), Array1::from(mass), Array1::from(z))
}
