//! Read-only HDF5 grid kept on disk.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use hdf5::{Dataset, File, Group};
use ndarray::{s, Array1, Array2};

use super::{
    check_row_range, describe, Aliases, Covariance, GridBackend, GridError, GridView, Header,
    ParamTable,
};
use crate::io::{hdf, FileType, COV_DIAG, COV_OFFDIAG, GRID, LAMB, SEDS};

/// Either an open HDF5 object or the values read from it
#[derive(Debug)]
enum Stored<H, T> {
    OnDisk(H),
    Loaded(T),
}

impl<H, T> Stored<H, T> {
    /// Read the values the first time they are needed.
    fn materialize<F>(&mut self, what: &'static str, read: F) -> Result<&mut T, GridError>
    where
        F: FnOnce(&H) -> Result<T, GridError>,
    {
        if let Stored::OnDisk(handle) = self {
            log::debug!("Materializing {what} from disk");
            let values = read(handle)?;
            *self = Stored::Loaded(values);
        }
        match self {
            Stored::Loaded(values) => Ok(values),
            Stored::OnDisk(_) => Err(GridError::MissingField(what)),
        }
    }

    fn loaded(&self) -> Option<&T> {
        match self {
            Stored::Loaded(values) => Some(values),
            Stored::OnDisk(_) => None,
        }
    }
}

/// HDF5 grid whose arrays stay on disk until a whole array is requested.
///
/// The header and aliases are read once when the file is opened. SED rows
/// can be read in blocks with [`GridBackend::seds_rows`] without ever
/// loading the full matrix.
#[derive(Debug)]
pub struct DiskBackend {
    path: PathBuf,
    source: String,
    // Keeps the file open for the lifetime of the handles below
    _file: File,
    lamb: Stored<Dataset, Array1<f64>>,
    seds: Stored<Dataset, Array2<f64>>,
    grid: Stored<Group, ParamTable>,
    cov_diag: Option<Stored<Dataset, Array2<f64>>>,
    cov_offdiag: Option<Stored<Dataset, Array2<f64>>>,
    header: Header,
    aliases: Aliases,
}

impl DiskBackend {
    /// Open an HDF5 grid file read-only.
    ///
    /// # Errors
    /// * `GridError::WrongFormat` - the extension or the contents are not HDF5
    /// * `GridError::Hdf5` - missing `lamb`, `seds` or `grid`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GridError> {
        let path = path.as_ref().to_path_buf();
        match FileType::from_path(&path)? {
            FileType::Hdf => {}
            other => {
                return Err(GridError::WrongFormat {
                    expected: FileType::Hdf.name(),
                    found: other.name(),
                })
            }
        }

        // Unreadable files are left for HDF5 to report
        if let Ok(Some(FileType::Fits)) = FileType::sniff(&path) {
            return Err(GridError::WrongFormat {
                expected: FileType::Hdf.name(),
                found: FileType::Fits.name(),
            });
        }

        log::debug!("Opening {} read-only", path.display());
        let file = File::open(&path)?;
        let lamb = file.dataset(LAMB)?;
        let seds = file.dataset(SEDS)?;
        let group = file.group(GRID)?;
        let (header, aliases) = hdf::header_from_group(&group)?;

        let optional = |name: &str| -> Result<Option<Dataset>, GridError> {
            if file.link_exists(name) {
                Ok(Some(file.dataset(name)?))
            } else {
                Ok(None)
            }
        };
        let (cov_diag, cov_offdiag) = match (optional(COV_DIAG)?, optional(COV_OFFDIAG)?) {
            (Some(diag), Some(offdiag)) => (
                Some(Stored::OnDisk(diag)),
                Some(Stored::OnDisk(offdiag)),
            ),
            (None, None) => (None, None),
            _ => {
                log::warn!(
                    "{} carries only one covariance term, ignoring it",
                    path.display()
                );
                (None, None)
            }
        };

        Ok(Self {
            source: path.display().to_string(),
            path,
            _file: file,
            lamb: Stored::OnDisk(lamb),
            seds: Stored::OnDisk(seds),
            grid: Stored::OnDisk(group),
            cov_diag,
            cov_offdiag,
            header,
            aliases,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `path` names the file this backend holds open
    fn is_source(&self, path: &Path) -> bool {
        match (path.canonicalize(), self.path.canonicalize()) {
            (Ok(target), Ok(source)) => target == source,
            _ => false,
        }
    }

    /// Number of SED rows without reading the SEDs
    fn seds_nrows(&self) -> usize {
        shape_of(&self.seds).0
    }
}

fn read_matrix(dataset: &Dataset) -> Result<Array2<f64>, GridError> {
    Ok(dataset.read_2d::<f64>()?)
}

/// A block of rows, from disk or from the loaded values
fn rows_of(
    stored: &Stored<Dataset, Array2<f64>>,
    rows: Range<usize>,
) -> Result<Array2<f64>, GridError> {
    match stored {
        Stored::OnDisk(dataset) => hdf::read_rows(dataset, rows),
        Stored::Loaded(values) => Ok(values.slice(s![rows, ..]).to_owned()),
    }
}

fn shape_of(stored: &Stored<Dataset, Array2<f64>>) -> (usize, usize) {
    match stored {
        Stored::OnDisk(dataset) => match dataset.shape().as_slice() {
            [nrows, ncols] => (*nrows, *ncols),
            _ => (0, 0),
        },
        Stored::Loaded(values) => values.dim(),
    }
}

impl GridBackend for DiskBackend {
    fn source(&self) -> &str {
        &self.source
    }

    fn lamb(&mut self) -> Result<&Array1<f64>, GridError> {
        let lamb: &Array1<f64> = self
            .lamb
            .materialize("lamb", |ds| Ok(ds.read_1d::<f64>()?))?;
        Ok(lamb)
    }

    fn seds(&mut self) -> Result<&Array2<f64>, GridError> {
        let seds: &Array2<f64> = self.seds.materialize("seds", read_matrix)?;
        Ok(seds)
    }

    fn grid(&mut self) -> Result<&ParamTable, GridError> {
        self.grid_mut().map(|grid| &*grid)
    }

    fn grid_mut(&mut self) -> Result<&mut ParamTable, GridError> {
        self.grid.materialize("grid", hdf::table_from_group)
    }

    fn cov_diag(&mut self) -> Result<Option<&Array2<f64>>, GridError> {
        match self.cov_diag.as_mut() {
            Some(stored) => {
                let cov: &Array2<f64> = stored.materialize("covdiag", read_matrix)?;
                Ok(Some(cov))
            }
            None => Ok(None),
        }
    }

    fn cov_offdiag(&mut self) -> Result<Option<&Array2<f64>>, GridError> {
        match self.cov_offdiag.as_mut() {
            Some(stored) => {
                let cov: &Array2<f64> = stored.materialize("covoffdiag", read_matrix)?;
                Ok(Some(cov))
            }
            None => Ok(None),
        }
    }

    fn header(&mut self) -> Result<&Header, GridError> {
        Ok(&self.header)
    }

    fn header_mut(&mut self) -> Result<&mut Header, GridError> {
        Ok(&mut self.header)
    }

    fn aliases(&mut self) -> Result<&Aliases, GridError> {
        Ok(&self.aliases)
    }

    fn set_lamb(&mut self, lamb: Array1<f64>) {
        self.lamb = Stored::Loaded(lamb);
    }

    fn set_seds(&mut self, seds: Array2<f64>) {
        self.seds = Stored::Loaded(seds);
    }

    fn set_grid(&mut self, grid: ParamTable) {
        self.grid = Stored::Loaded(grid);
    }

    fn set_covariance(&mut self, covariance: Option<Covariance>) {
        match covariance {
            Some(Covariance { diag, offdiag }) => {
                self.cov_diag = Some(Stored::Loaded(diag));
                self.cov_offdiag = Some(Stored::Loaded(offdiag));
            }
            None => {
                self.cov_diag = None;
                self.cov_offdiag = None;
            }
        }
    }

    fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    fn keys(&mut self) -> Result<Vec<String>, GridError> {
        match &self.grid {
            Stored::OnDisk(group) => hdf::column_names(group),
            Stored::Loaded(grid) => Ok(grid.keys()),
        }
    }

    fn len(&mut self) -> Result<usize, GridError> {
        match &self.grid {
            Stored::Loaded(grid) => Ok(grid.len()),
            Stored::OnDisk(_) => Ok(self.seds_nrows()),
        }
    }

    fn seds_rows(&mut self, rows: Range<usize>) -> Result<Array2<f64>, GridError> {
        check_row_range(&rows, self.seds_nrows())?;
        rows_of(&self.seds, rows)
    }

    fn nbytes(&self) -> usize {
        let f64_size = std::mem::size_of::<f64>();
        let cov_len = |slot: &Option<Stored<Dataset, Array2<f64>>>| {
            slot.as_ref()
                .and_then(Stored::loaded)
                .map_or(0, |a| a.len())
        };
        self.lamb.loaded().map_or(0, |a| a.len() * f64_size)
            + self.seds.loaded().map_or(0, |a| a.len() * f64_size)
            + (cov_len(&self.cov_diag) + cov_len(&self.cov_offdiag)) * f64_size
            + self.grid.loaded().map_or(0, ParamTable::nbytes)
            + self.header.nbytes()
    }

    fn view(&mut self) -> Result<GridView<'_>, GridError> {
        self.lamb()?;
        self.seds()?;
        self.grid()?;
        self.cov_diag()?;
        self.cov_offdiag()?;

        Ok(GridView {
            lamb: self.lamb.loaded(),
            seds: self.seds.loaded(),
            grid: self.grid.loaded(),
            cov_diag: self.cov_diag.as_ref().and_then(Stored::loaded),
            cov_offdiag: self.cov_offdiag.as_ref().and_then(Stored::loaded),
            header: &self.header,
            aliases: &self.aliases,
        })
    }

    /// Reopen the same file; values already read or replaced are carried
    /// over.
    fn copy(&self) -> Result<Self, GridError> {
        let mut copy = DiskBackend::open(&self.path)?;
        if let Some(lamb) = self.lamb.loaded() {
            copy.lamb = Stored::Loaded(lamb.clone());
        }
        if let Some(seds) = self.seds.loaded() {
            copy.seds = Stored::Loaded(seds.clone());
        }
        if let Some(grid) = self.grid.loaded() {
            copy.grid = Stored::Loaded(grid.clone());
        }
        let carry = |slot: &Option<Stored<Dataset, Array2<f64>>>,
                     fresh: Option<Stored<Dataset, Array2<f64>>>| match slot {
            Some(Stored::Loaded(values)) => Some(Stored::Loaded(values.clone())),
            Some(Stored::OnDisk(_)) => fresh,
            None => None,
        };
        copy.cov_diag = carry(&self.cov_diag, copy.cov_diag.take());
        copy.cov_offdiag = carry(&self.cov_offdiag, copy.cov_offdiag.take());
        copy.header = self.header.clone();
        copy.aliases = self.aliases.clone();
        Ok(copy)
    }

    /// Write to HDF5; with `append` the models are added to an existing
    /// file instead of replacing it.
    ///
    /// SED and covariance rows still on disk are streamed in blocks of
    /// [`hdf::CHUNK_ROWS`] and never loaded whole.
    fn write_hdf(&mut self, path: &Path, append: bool) -> Result<(), GridError> {
        if self.is_source(path) {
            return Err(GridError::SourceInUse(path.display().to_string()));
        }
        self.lamb()?;
        self.grid()?;
        let (lamb, grid) = match (self.lamb.loaded(), self.grid.loaded()) {
            (Some(lamb), Some(grid)) => (lamb, grid),
            _ => return Err(GridError::IncompleteGrid),
        };

        let (nrows, nbands) = shape_of(&self.seds);
        if nbands != lamb.len() {
            return Err(GridError::LengthMismatch {
                what: "wavelengths vs SED bins".to_string(),
                expected: nbands,
                found: lamb.len(),
            });
        }
        if grid.num_columns() > 0 && grid.len() != nrows {
            return Err(GridError::LengthMismatch {
                what: "parameter table rows".to_string(),
                expected: nrows,
                found: grid.len(),
            });
        }
        let covariance = match (&self.cov_diag, &self.cov_offdiag) {
            (Some(diag), Some(offdiag)) => Some((diag, offdiag)),
            _ => None,
        };
        if let Some((diag, offdiag)) = covariance {
            for (what, cov) in [("covdiag rows", diag), ("covoffdiag rows", offdiag)] {
                if shape_of(cov).0 != nrows {
                    return Err(GridError::LengthMismatch {
                        what: what.to_string(),
                        expected: nrows,
                        found: shape_of(cov).0,
                    });
                }
            }
        }
        let widths = covariance.map(|(diag, offdiag)| (shape_of(diag).1, shape_of(offdiag).1));

        let mut appender = if append && path.exists() {
            hdf::GridAppender::open(path, lamb.len(), grid, widths)?
        } else {
            hdf::GridAppender::create(path, lamb, grid, widths)?
        };
        for start in (0..nrows).step_by(hdf::CHUNK_ROWS) {
            let rows = start..(start + hdf::CHUNK_ROWS).min(nrows);
            let seds = rows_of(&self.seds, rows.clone())?;
            let cov = match covariance {
                Some((diag, offdiag)) => Some((
                    rows_of(diag, rows.clone())?,
                    rows_of(offdiag, rows.clone())?,
                )),
                None => None,
            };
            appender.push_seds(
                seds.view(),
                cov.as_ref().map(|(diag, offdiag)| (diag.view(), offdiag.view())),
            )?;
        }
        appender.push_table(grid)?;
        appender.finish(&self.header, &self.aliases)?;
        Ok(())
    }
}

impl fmt::Display for DiskBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, "DiskBackend", &self.source, self.nbytes())
    }
}
