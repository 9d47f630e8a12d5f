//! Eager, fully in-memory grid.

use std::fmt;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};

use super::{
    describe, Aliases, CompleteGrid, Covariance, GridBackend, GridError, GridView, Header,
    ParamTable,
};
use crate::io::{self, FileType};

const MEMORY_SOURCE: &str = ":memory:";

/// Grid held entirely in memory.
///
/// The SEDs and wavelengths are optional so a grid can be assembled or
/// stripped piece by piece; writing requires all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBackend {
    lamb: Option<Array1<f64>>,
    seds: Option<Array2<f64>>,
    grid: Option<ParamTable>,
    covariance: Option<Covariance>,
    header: Header,
    aliases: Aliases,
    source: String,
}

impl MemoryBackend {
    /// Build a grid from arrays.
    ///
    /// # Arguments
    /// * `lamb` - Wavelength of each SED band
    /// * `seds` - SED matrix (models x bands), required
    /// * `grid` - Parameter table, one row per model, required
    /// * `cov_diag`, `cov_offdiag` - Covariance terms; kept only when both
    ///   are given
    ///
    /// # Errors
    /// * `GridError::MissingArguments` - `seds` or `grid` not supplied
    /// * `GridError::LengthMismatch` - shapes do not agree
    pub fn from_arrays(
        lamb: Array1<f64>,
        seds: Option<Array2<f64>>,
        grid: Option<ParamTable>,
        cov_diag: Option<Array2<f64>>,
        cov_offdiag: Option<Array2<f64>>,
    ) -> Result<Self, GridError> {
        let (seds, grid) = match (seds, grid) {
            (Some(seds), Some(grid)) => (seds, grid),
            (None, _) => return Err(GridError::MissingArguments("seds not given".to_string())),
            (_, None) => return Err(GridError::MissingArguments("grid not given".to_string())),
        };

        let covariance = match (cov_diag, cov_offdiag) {
            (Some(diag), Some(offdiag)) => Some(Covariance { diag, offdiag }),
            (None, None) => None,
            _ => {
                log::warn!("Only one covariance term given, both are dropped");
                None
            }
        };

        let backend = Self {
            lamb: Some(lamb),
            seds: Some(seds),
            grid: Some(grid),
            covariance,
            header: Header::new(),
            aliases: Aliases::new(),
            source: MEMORY_SOURCE.to_string(),
        };
        backend.check_complete()?;
        Ok(backend)
    }

    /// Deep copy of any backend, loading whatever it still keeps on disk.
    pub fn from_backend(other: &mut dyn GridBackend) -> Result<Self, GridError> {
        let source = other.source().to_string();
        let view = other.view()?;
        let covariance = match (view.cov_diag, view.cov_offdiag) {
            (Some(diag), Some(offdiag)) => Some(Covariance {
                diag: diag.clone(),
                offdiag: offdiag.clone(),
            }),
            _ => None,
        };
        Ok(Self {
            lamb: view.lamb.cloned(),
            seds: view.seds.cloned(),
            grid: view.grid.cloned(),
            covariance,
            header: view.header.clone(),
            aliases: view.aliases.clone(),
            source,
        })
    }

    /// Read a FITS or HDF5 grid completely.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GridError> {
        let path = path.as_ref();
        let file_type = FileType::from_path(path)?;
        let data = io::read_grid(path, file_type)?;
        let backend = Self {
            lamb: Some(data.lamb),
            seds: Some(data.seds),
            grid: Some(data.grid),
            covariance: data.covariance,
            header: data.header,
            aliases: data.aliases,
            source: path.display().to_string(),
        };
        backend.check_complete()?;
        Ok(backend)
    }

    /// Merge extra header entries, overriding existing keys.
    pub fn with_header(mut self, header: &Header) -> Self {
        self.header.merge(header);
        self
    }

    /// Merge extra column aliases.
    pub fn with_aliases(mut self, aliases: &Aliases) -> Self {
        self.aliases
            .extend(aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// New grid holding the given models, in the given order.
    ///
    /// SEDs, covariances and the parameter table are subset together.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self, GridError> {
        let nrows = self
            .seds
            .as_ref()
            .map(Array2::nrows)
            .or_else(|| self.grid.as_ref().map(ParamTable::len))
            .unwrap_or(0);
        if let Some(&bad) = rows.iter().find(|&&r| r >= nrows) {
            return Err(GridError::RowOutOfRange { row: bad, nrows });
        }

        let grid = self
            .grid
            .as_ref()
            .map(|g| g.select_rows(rows))
            .transpose()?;
        Ok(Self {
            lamb: self.lamb.clone(),
            seds: self.seds.as_ref().map(|s| s.select(Axis(0), rows)),
            grid,
            covariance: self.covariance.as_ref().map(|c| Covariance {
                diag: c.diag.select(Axis(0), rows),
                offdiag: c.offdiag.select(Axis(0), rows),
            }),
            header: self.header.clone(),
            aliases: self.aliases.clone(),
            source: self.source.clone(),
        })
    }

    /// Remove the SED matrix, returning it.
    pub fn take_seds(&mut self) -> Option<Array2<f64>> {
        self.seds.take()
    }

    fn check_complete(&self) -> Result<(), GridError> {
        if let (Some(lamb), Some(seds), Some(grid)) = (&self.lamb, &self.seds, &self.grid) {
            CompleteGrid {
                lamb,
                seds,
                grid,
                covariance: self.covariance.as_ref().map(|c| (&c.diag, &c.offdiag)),
                header: &self.header,
                aliases: &self.aliases,
            }
            .check_shapes()?;
        }
        Ok(())
    }
}

impl GridBackend for MemoryBackend {
    fn source(&self) -> &str {
        &self.source
    }

    fn lamb(&mut self) -> Result<&Array1<f64>, GridError> {
        self.lamb.as_ref().ok_or(GridError::MissingField("lamb"))
    }

    fn seds(&mut self) -> Result<&Array2<f64>, GridError> {
        self.seds.as_ref().ok_or(GridError::MissingField("seds"))
    }

    fn grid(&mut self) -> Result<&ParamTable, GridError> {
        self.grid.as_ref().ok_or(GridError::MissingField("grid"))
    }

    fn grid_mut(&mut self) -> Result<&mut ParamTable, GridError> {
        self.grid.as_mut().ok_or(GridError::MissingField("grid"))
    }

    fn cov_diag(&mut self) -> Result<Option<&Array2<f64>>, GridError> {
        Ok(self.covariance.as_ref().map(|c| &c.diag))
    }

    fn cov_offdiag(&mut self) -> Result<Option<&Array2<f64>>, GridError> {
        Ok(self.covariance.as_ref().map(|c| &c.offdiag))
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
        self.lamb = Some(lamb);
    }

    fn set_seds(&mut self, seds: Array2<f64>) {
        self.seds = Some(seds);
    }

    fn set_grid(&mut self, grid: ParamTable) {
        self.grid = Some(grid);
    }

    fn set_covariance(&mut self, covariance: Option<Covariance>) {
        self.covariance = covariance;
    }

    fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    fn keys(&mut self) -> Result<Vec<String>, GridError> {
        Ok(self.grid.as_ref().map(ParamTable::keys).unwrap_or_default())
    }

    fn nbytes(&self) -> usize {
        let f64_size = std::mem::size_of::<f64>();
        self.lamb.as_ref().map_or(0, |a| a.len() * f64_size)
            + self.seds.as_ref().map_or(0, |a| a.len() * f64_size)
            + self
                .covariance
                .as_ref()
                .map_or(0, |c| (c.diag.len() + c.offdiag.len()) * f64_size)
            + self.grid.as_ref().map_or(0, ParamTable::nbytes)
            + self.header.nbytes()
    }

    fn view(&mut self) -> Result<GridView<'_>, GridError> {
        Ok(GridView {
            lamb: self.lamb.as_ref(),
            seds: self.seds.as_ref(),
            grid: self.grid.as_ref(),
            cov_diag: self.covariance.as_ref().map(|c| &c.diag),
            cov_offdiag: self.covariance.as_ref().map(|c| &c.offdiag),
            header: &self.header,
            aliases: &self.aliases,
        })
    }

    fn copy(&self) -> Result<Self, GridError> {
        Ok(self.clone())
    }

    fn write_hdf(&mut self, path: &Path, append: bool) -> Result<(), GridError> {
        if append {
            return Err(GridError::AppendNotSupported("memory"));
        }
        let view = self.view()?;
        io::hdf::write_grid(path, &view.complete()?)
    }
}

impl fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, "MemoryBackend", &self.source, self.nbytes())
    }
}
