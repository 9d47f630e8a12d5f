//! File-bound grid that loads each field on first access.

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};

use super::{
    describe, Aliases, Covariance, GridBackend, GridError, GridView, Header, ParamTable,
};
use crate::io::{self, FileType, COV_DIAG, COV_OFFDIAG};

/// Individually cached parts of a grid file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridField {
    Lamb,
    Seds,
    Grid,
    CovDiag,
    CovOffdiag,
    /// Header and aliases, which are loaded together
    Header,
}

/// Grid backed by a FITS or HDF5 file with per-field caching.
///
/// Nothing is read at construction. Every accessor fills its own slot from
/// the file the first time and serves the cached value afterwards; a
/// covariance slot remembers that the file has no such array.
#[derive(Debug, Clone)]
pub struct CacheBackend {
    path: PathBuf,
    source: String,
    file_type: FileType,
    lamb: Option<Array1<f64>>,
    seds: Option<Array2<f64>>,
    grid: Option<ParamTable>,
    cov_diag: Option<Option<Array2<f64>>>,
    cov_offdiag: Option<Option<Array2<f64>>>,
    header: Option<Header>,
    aliases: Option<Aliases>,
}

impl CacheBackend {
    /// Bind to a grid file. The format is taken from the extension.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GridError> {
        let path = path.as_ref().to_path_buf();
        let file_type = FileType::from_path(&path)?;
        log::debug!("Binding cache backend to {file_type} file {}", path.display());
        Ok(Self {
            source: path.display().to_string(),
            path,
            file_type,
            lamb: None,
            seds: None,
            grid: None,
            cov_diag: None,
            cov_offdiag: None,
            header: None,
            aliases: None,
        })
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Drop one cached field, or every field with `None`.
    ///
    /// Values set in memory are dropped too; the next access re-reads the
    /// file.
    pub fn clear(&mut self, field: Option<GridField>) {
        match field {
            Some(GridField::Lamb) => self.lamb = None,
            Some(GridField::Seds) => self.seds = None,
            Some(GridField::Grid) => self.grid = None,
            Some(GridField::CovDiag) => self.cov_diag = None,
            Some(GridField::CovOffdiag) => self.cov_offdiag = None,
            Some(GridField::Header) => {
                self.header = None;
                self.aliases = None;
            }
            None => {
                self.lamb = None;
                self.seds = None;
                self.grid = None;
                self.cov_diag = None;
                self.cov_offdiag = None;
                self.header = None;
                self.aliases = None;
            }
        }
    }

    /// Whether a field is currently held in memory
    pub fn is_loaded(&self, field: GridField) -> bool {
        match field {
            GridField::Lamb => self.lamb.is_some(),
            GridField::Seds => self.seds.is_some(),
            GridField::Grid => self.grid.is_some(),
            GridField::CovDiag => self.cov_diag.is_some(),
            GridField::CovOffdiag => self.cov_offdiag.is_some(),
            GridField::Header => self.header.is_some(),
        }
    }

    fn load_covariance(&self, name: &str) -> Result<Option<Array2<f64>>, GridError> {
        log::debug!("Loading {name} from {}", self.source);
        io::read_covariance(&self.path, self.file_type, name)
    }
}

impl GridBackend for CacheBackend {
    fn source(&self) -> &str {
        &self.source
    }

    fn lamb(&mut self) -> Result<&Array1<f64>, GridError> {
        let lamb = match self.lamb.take() {
            Some(lamb) => lamb,
            None => {
                log::debug!("Loading lamb from {}", self.source);
                io::read_lamb(&self.path, self.file_type)?
            }
        };
        Ok(&*self.lamb.insert(lamb))
    }

    fn seds(&mut self) -> Result<&Array2<f64>, GridError> {
        let seds = match self.seds.take() {
            Some(seds) => seds,
            None => {
                log::debug!("Loading seds from {}", self.source);
                io::read_seds(&self.path, self.file_type)?
            }
        };
        Ok(&*self.seds.insert(seds))
    }

    fn grid(&mut self) -> Result<&ParamTable, GridError> {
        self.grid_mut().map(|grid| &*grid)
    }

    fn grid_mut(&mut self) -> Result<&mut ParamTable, GridError> {
        let grid = match self.grid.take() {
            Some(grid) => grid,
            None => {
                log::debug!("Loading grid table from {}", self.source);
                io::read_table(&self.path, self.file_type)?
            }
        };
        Ok(self.grid.insert(grid))
    }

    fn cov_diag(&mut self) -> Result<Option<&Array2<f64>>, GridError> {
        let cov = match self.cov_diag.take() {
            Some(cov) => cov,
            None => self.load_covariance(COV_DIAG)?,
        };
        Ok(self.cov_diag.insert(cov).as_ref())
    }

    fn cov_offdiag(&mut self) -> Result<Option<&Array2<f64>>, GridError> {
        let cov = match self.cov_offdiag.take() {
            Some(cov) => cov,
            None => self.load_covariance(COV_OFFDIAG)?,
        };
        Ok(self.cov_offdiag.insert(cov).as_ref())
    }

    fn header(&mut self) -> Result<&Header, GridError> {
        self.header_mut().map(|header| &*header)
    }

    fn header_mut(&mut self) -> Result<&mut Header, GridError> {
        let header = match self.header.take() {
            Some(header) => header,
            None => {
                log::debug!("Loading header from {}", self.source);
                let (header, aliases) = io::read_header(&self.path, self.file_type)?;
                self.aliases.get_or_insert(aliases);
                header
            }
        };
        Ok(self.header.insert(header))
    }

    fn aliases(&mut self) -> Result<&Aliases, GridError> {
        let aliases = match self.aliases.take() {
            Some(aliases) => aliases,
            None => {
                let (header, aliases) = io::read_header(&self.path, self.file_type)?;
                self.header.get_or_insert(header);
                aliases
            }
        };
        Ok(&*self.aliases.insert(aliases))
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
        match covariance {
            Some(Covariance { diag, offdiag }) => {
                self.cov_diag = Some(Some(diag));
                self.cov_offdiag = Some(Some(offdiag));
            }
            None => {
                self.cov_diag = Some(None);
                self.cov_offdiag = Some(None);
            }
        }
    }

    fn set_header(&mut self, header: Header) {
        self.header = Some(header);
    }

    fn keys(&mut self) -> Result<Vec<String>, GridError> {
        match &self.grid {
            Some(grid) => Ok(grid.keys()),
            None => io::read_column_names(&self.path, self.file_type),
        }
    }

    fn nbytes(&self) -> usize {
        let f64_size = std::mem::size_of::<f64>();
        let cov_len = |slot: &Option<Option<Array2<f64>>>| {
            slot.as_ref().and_then(Option::as_ref).map_or(0, |a| a.len())
        };
        self.lamb.as_ref().map_or(0, |a| a.len() * f64_size)
            + self.seds.as_ref().map_or(0, |a| a.len() * f64_size)
            + (cov_len(&self.cov_diag) + cov_len(&self.cov_offdiag)) * f64_size
            + self.grid.as_ref().map_or(0, ParamTable::nbytes)
            + self.header.as_ref().map_or(0, Header::nbytes)
    }

    fn view(&mut self) -> Result<GridView<'_>, GridError> {
        self.lamb()?;
        self.seds()?;
        self.grid()?;
        self.cov_diag()?;
        self.cov_offdiag()?;
        self.header()?;
        self.aliases()?;

        let (Some(header), Some(aliases)) = (&self.header, &self.aliases) else {
            return Err(GridError::MissingField("header"));
        };
        Ok(GridView {
            lamb: self.lamb.as_ref(),
            seds: self.seds.as_ref(),
            grid: self.grid.as_ref(),
            cov_diag: self.cov_diag.as_ref().and_then(Option::as_ref),
            cov_offdiag: self.cov_offdiag.as_ref().and_then(Option::as_ref),
            header,
            aliases,
        })
    }

    fn copy(&self) -> Result<Self, GridError> {
        Ok(self.clone())
    }

    fn write_hdf(&mut self, path: &Path, append: bool) -> Result<(), GridError> {
        if append {
            return Err(GridError::AppendNotSupported("cache"));
        }
        let view = self.view()?;
        io::hdf::write_grid(path, &view.complete()?)
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, "CacheBackend", &self.source, self.nbytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_extension() {
        assert!(matches!(
            CacheBackend::new("grid.txt"),
            Err(GridError::UnsupportedExtension(ext)) if ext == "txt"
        ));
    }

    #[test]
    fn test_nothing_loaded_at_construction() {
        let backend = CacheBackend::new("never_opened.fits").unwrap();
        for field in [
            GridField::Lamb,
            GridField::Seds,
            GridField::Grid,
            GridField::CovDiag,
            GridField::CovOffdiag,
            GridField::Header,
        ] {
            assert!(!backend.is_loaded(field));
        }
        assert_eq!(backend.nbytes(), 0);
        assert_eq!(backend.file_type(), FileType::Fits);
    }

    #[test]
    fn test_set_and_clear_single_field() {
        let mut backend = CacheBackend::new("never_opened.hdf5").unwrap();
        backend.set_lamb(ndarray::array![1.0, 2.0]);
        backend.set_covariance(None);
        assert!(backend.is_loaded(GridField::Lamb));
        assert!(backend.cov_diag().unwrap().is_none());

        backend.clear(Some(GridField::Lamb));
        assert!(!backend.is_loaded(GridField::Lamb));
        assert!(backend.is_loaded(GridField::CovDiag));

        backend.clear(None);
        assert!(!backend.is_loaded(GridField::CovDiag));
    }
}
