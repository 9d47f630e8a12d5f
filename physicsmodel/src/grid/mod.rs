//! Model grid storage backends.
//!
//! A model grid is the set of precomputed SEDs plus the physical parameters
//! that generated them. Grids can be far larger than memory, so access goes
//! through the [`GridBackend`] trait with three realizations:
//!
//! - [`MemoryBackend`]: everything loaded eagerly. Built from arrays, another
//!   backend, or a FITS/HDF5 file.
//! - [`CacheBackend`]: bound to a file, each field loaded on first access and
//!   cached independently. Individual fields can be dropped again with
//!   [`CacheBackend::clear`].
//! - [`DiskBackend`]: HDF5 opened read-only; datasets stay on disk until a
//!   whole array is requested and SED rows can be read as hyperslabs.
//!
//! Every realization exposes the same capability set and can be written to
//! FITS or HDF5 with [`GridBackend::write`].
//!
//! # Row correspondence
//! Row `i` of `seds`, of the parameter table and of both covariance arrays
//! describe the same model. Constructors and writers check this; operations
//! that subset rows (see [`MemoryBackend::select_rows`]) apply to all of
//! them together.

pub mod cache;
pub mod disk;
pub mod memory;
pub mod table;

use std::fmt;
use std::ops::Range;
use std::path::Path;

use ndarray::{s, Array1, Array2};
use thiserror::Error;

use crate::io::{self, FileType};

pub use cache::{CacheBackend, GridField};
pub use disk::DiskBackend;
pub use memory::MemoryBackend;
pub use table::{Aliases, Column, Header, HeaderValue, ParamTable, FILTERS_KEY};

/// Errors raised by grid backends and grid file I/O
#[derive(Error, Debug)]
pub enum GridError {
    #[error("{0} file type not supported")]
    UnsupportedExtension(String),
    #[error("Expecting {expected} file, got {found}")]
    WrongFormat {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Wrong number of arguments: {0}")]
    MissingArguments(String),
    #[error("Full data set not specified (lamb, seds, grid)")]
    IncompleteGrid,
    #[error("{0} is not loaded or was released")]
    MissingField(&'static str),
    #[error("Appending is not supported by the {0} backend")]
    AppendNotSupported(&'static str),
    #[error("Cannot write {0} while it is open as the grid source")]
    SourceInUse(String),
    #[error("Column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Column already exists: {0}")]
    DuplicateColumn(String),
    #[error("Length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    #[error("Row {row} out of range for grid with {nrows} models")]
    RowOutOfRange { row: usize, nrows: usize },
    #[error("Table columns differ: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },
    #[error("Invalid array shape: {0}")]
    Shape(String),
    #[error("Invalid string value: {0}")]
    InvalidString(String),
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),
    #[error("CFITSIO status {status} while {context}")]
    FitsStatus { status: i32, context: String },
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagonal and off-diagonal absolute flux covariance terms.
///
/// Both arrays have one row per model; they are always present together.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance {
    pub diag: Array2<f64>,
    pub offdiag: Array2<f64>,
}

/// Borrowed snapshot of everything a backend currently holds
#[derive(Debug)]
pub struct GridView<'a> {
    pub lamb: Option<&'a Array1<f64>>,
    pub seds: Option<&'a Array2<f64>>,
    pub grid: Option<&'a ParamTable>,
    pub cov_diag: Option<&'a Array2<f64>>,
    pub cov_offdiag: Option<&'a Array2<f64>>,
    pub header: &'a Header,
    pub aliases: &'a Aliases,
}

/// A view with every required field present and row counts checked
#[derive(Debug, Clone, Copy)]
pub struct CompleteGrid<'a> {
    pub lamb: &'a Array1<f64>,
    pub seds: &'a Array2<f64>,
    pub grid: &'a ParamTable,
    pub covariance: Option<(&'a Array2<f64>, &'a Array2<f64>)>,
    pub header: &'a Header,
    pub aliases: &'a Aliases,
}

impl<'a> GridView<'a> {
    /// Require wavelengths, SEDs and parameter table, and check that their
    /// shapes agree.
    pub fn complete(&self) -> Result<CompleteGrid<'a>, GridError> {
        let (lamb, seds, grid) = match (self.lamb, self.seds, self.grid) {
            (Some(lamb), Some(seds), Some(grid)) => (lamb, seds, grid),
            _ => return Err(GridError::IncompleteGrid),
        };

        let covariance = match (self.cov_diag, self.cov_offdiag) {
            (Some(diag), Some(offdiag)) => Some((diag, offdiag)),
            (None, None) => None,
            _ => {
                log::warn!("Only one covariance term present; neither will be written");
                None
            }
        };

        let grid = CompleteGrid {
            lamb,
            seds,
            grid,
            covariance,
            header: self.header,
            aliases: self.aliases,
        };
        grid.check_shapes()?;
        Ok(grid)
    }
}

impl CompleteGrid<'_> {
    /// Verify the row correspondence and wavelength count.
    pub fn check_shapes(&self) -> Result<(), GridError> {
        let (nmodels, nbins) = self.seds.dim();
        if self.lamb.len() != nbins {
            return Err(GridError::LengthMismatch {
                what: "wavelengths vs SED bins".to_string(),
                expected: nbins,
                found: self.lamb.len(),
            });
        }
        if self.grid.num_columns() > 0 && self.grid.len() != nmodels {
            return Err(GridError::LengthMismatch {
                what: "parameter table rows".to_string(),
                expected: nmodels,
                found: self.grid.len(),
            });
        }
        if let Some((diag, offdiag)) = self.covariance {
            for (what, cov) in [("covdiag rows", diag), ("covoffdiag rows", offdiag)] {
                if cov.nrows() != nmodels {
                    return Err(GridError::LengthMismatch {
                        what: what.to_string(),
                        expected: nmodels,
                        found: cov.nrows(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Owned grid contents as read from a file
#[derive(Debug, Clone)]
pub struct GridData {
    pub lamb: Array1<f64>,
    pub seds: Array2<f64>,
    pub grid: ParamTable,
    pub covariance: Option<Covariance>,
    pub header: Header,
    pub aliases: Aliases,
}

/// Uniform access to a model grid, whatever its storage.
///
/// Accessors take `&mut self` because lazy realizations fill their caches
/// on first access. All of them return the same values for the same file.
pub trait GridBackend {
    /// Where the data comes from: a file path or `:memory:`
    fn source(&self) -> &str;

    /// Wavelengths of the SED bins
    fn lamb(&mut self) -> Result<&Array1<f64>, GridError>;

    /// SED matrix, shape (n_models, n_bins)
    fn seds(&mut self) -> Result<&Array2<f64>, GridError>;

    /// Parameter table, one row per model
    fn grid(&mut self) -> Result<&ParamTable, GridError>;

    /// Mutable parameter table, used to add weight columns
    fn grid_mut(&mut self) -> Result<&mut ParamTable, GridError>;

    fn cov_diag(&mut self) -> Result<Option<&Array2<f64>>, GridError>;

    fn cov_offdiag(&mut self) -> Result<Option<&Array2<f64>>, GridError>;

    fn header(&mut self) -> Result<&Header, GridError>;

    fn header_mut(&mut self) -> Result<&mut Header, GridError>;

    /// Alternate column name -> canonical column name
    fn aliases(&mut self) -> Result<&Aliases, GridError>;

    fn set_lamb(&mut self, lamb: Array1<f64>);

    fn set_seds(&mut self, seds: Array2<f64>);

    fn set_grid(&mut self, grid: ParamTable);

    fn set_covariance(&mut self, covariance: Option<Covariance>);

    fn set_header(&mut self, header: Header);

    /// Parameter-table column names, without loading the columns when the
    /// storage can list them directly.
    fn keys(&mut self) -> Result<Vec<String>, GridError>;

    /// Estimated bytes currently held in memory
    fn nbytes(&self) -> usize;

    /// Borrow every field at once, loading whatever is still on disk.
    fn view(&mut self) -> Result<GridView<'_>, GridError>;

    /// Independent deep copy of the same realization
    fn copy(&self) -> Result<Self, GridError>
    where
        Self: Sized;

    /// Write to HDF5. `append` extends an existing file's arrays and table
    /// and is only supported by [`DiskBackend`].
    fn write_hdf(&mut self, path: &Path, append: bool) -> Result<(), GridError>;

    /// Filter names from the header
    fn filters(&mut self) -> Result<Option<Vec<String>>, GridError> {
        Ok(self.header()?.filters())
    }

    /// Replace the filter list stored in the header
    fn set_filters(&mut self, filters: &[String]) -> Result<(), GridError> {
        self.header_mut()?.set_filters(filters);
        Ok(())
    }

    /// Number of models
    fn len(&mut self) -> Result<usize, GridError> {
        Ok(self.grid()?.len())
    }

    fn is_empty(&mut self) -> Result<bool, GridError> {
        Ok(self.len()? == 0)
    }

    /// A contiguous block of SED rows
    fn seds_rows(&mut self, rows: Range<usize>) -> Result<Array2<f64>, GridError> {
        let seds = self.seds()?;
        check_row_range(&rows, seds.nrows())?;
        Ok(seds.slice(s![rows, ..]).to_owned())
    }

    /// Canonical column name for `name`, following the alias map when the
    /// name itself is not a column.
    fn resolve_column(&mut self, name: &str) -> Result<String, GridError> {
        if self.keys()?.iter().any(|k| k == name) {
            return Ok(name.to_string());
        }
        match self.aliases()?.get(name) {
            Some(canonical) => Ok(canonical.clone()),
            None => Err(GridError::ColumnNotFound(name.to_string())),
        }
    }

    /// A copy of one parameter column, alias aware
    fn column(&mut self, name: &str) -> Result<Column, GridError> {
        let canonical = self.resolve_column(name)?;
        self.grid()?
            .column(&canonical)
            .cloned()
            .ok_or(GridError::ColumnNotFound(canonical))
    }

    /// Write to a file whose format is chosen from the extension.
    ///
    /// `.fits` writes FITS; `.hdf`, `.hd5` and `.hdf5` write HDF5.
    fn write(&mut self, path: &Path) -> Result<(), GridError> {
        match FileType::from_path(path)? {
            FileType::Fits => self.write_fits(path, false),
            FileType::Hdf => self.write_hdf(path, false),
        }
    }

    /// Write to FITS: primary HDU wavelengths, `seds` image, optional
    /// `covdiag`/`covoffdiag` images and the `grid` binary table.
    fn write_fits(&mut self, path: &Path, overwrite: bool) -> Result<(), GridError> {
        let view = self.view()?;
        let grid = view.complete()?;
        io::fits::write_grid(path, &grid, overwrite)
    }
}

pub(crate) fn check_row_range(rows: &Range<usize>, nrows: usize) -> Result<(), GridError> {
    if rows.start > rows.end || rows.end > nrows {
        return Err(GridError::RowOutOfRange {
            row: rows.end.max(rows.start),
            nrows,
        });
    }
    Ok(())
}

/// Which realization to construct when opening a grid file.
///
/// Also parsed from the command line; the accepted names are the
/// [`Display`](fmt::Display) names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Read the whole file up front
    Memory,
    /// Read each field on first use
    Cache,
    /// Keep HDF5 datasets on disk
    Disk,
}

impl BackendKind {
    /// Open `path` with this realization
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Box<dyn GridBackend>, GridError> {
        Ok(match self {
            BackendKind::Memory => Box::new(MemoryBackend::from_file(path)?),
            BackendKind::Cache => Box::new(CacheBackend::new(path)?),
            BackendKind::Disk => Box::new(DiskBackend::open(path)?),
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Cache => write!(f, "cache"),
            BackendKind::Disk => write!(f, "disk"),
        }
    }
}

/// Human readable byte count, e.g. `"1.50 MiB"`
pub fn pretty_size_print(num_bytes: usize) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    let mut value = num_bytes as f64;
    if value < 1024.0 {
        return format!("{num_bytes} bytes");
    }
    let mut unit = UNITS[0];
    for name in UNITS {
        value /= 1024.0;
        unit = name;
        if value < 1024.0 {
            break;
        }
    }
    format!("{value:.2} {unit}")
}

pub(crate) fn describe(f: &mut fmt::Formatter<'_>, kind: &str, source: &str, nbytes: usize) -> fmt::Result {
    write!(
        f,
        "{kind}\n source: {source}, \n current memory footprint: {}",
        pretty_size_print(nbytes)
    )
}
