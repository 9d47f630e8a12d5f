//! Grid file formats.
//!
//! Two on-disk layouts are supported, chosen by file extension:
//! - FITS (`.fits`): see [`fits`]
//! - HDF5 (`.hdf`, `.hd5`, `.hdf5`): see [`hdf`]
//!
//! The functions re-exported here dispatch on [`FileType`] so lazy backends
//! can load one field at a time without caring about the format.

pub mod fits;
pub(crate) mod fits_keys;
pub mod hdf;

use std::fmt;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::grid::{Aliases, GridData, GridError, Header, ParamTable};

/// Name of the SED image / dataset
pub const SEDS: &str = "seds";
/// Name of the wavelength dataset (HDF only; FITS stores it in the primary HDU)
pub const LAMB: &str = "lamb";
/// Name of the diagonal covariance image / dataset
pub const COV_DIAG: &str = "covdiag";
/// Name of the off-diagonal covariance image / dataset
pub const COV_OFFDIAG: &str = "covoffdiag";
/// Name of the parameter table extension / group
pub const GRID: &str = "grid";

/// Signature at the start of an HDF5 superblock
const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];
/// First keyword of every FITS primary header
const FITS_SIGNATURE: &[u8] = b"SIMPLE  =";

/// Storage format of a grid file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Fits,
    Hdf,
}

impl FileType {
    /// Detect the format from the last dot-separated segment of the file
    /// name. Matching is case sensitive.
    ///
    /// # Errors
    /// `GridError::UnsupportedExtension` carrying the extension (or the whole
    /// name when there is no dot).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, GridError> {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = name.rsplit('.').next().unwrap_or_default();
        match extension {
            "fits" => Ok(FileType::Fits),
            "hdf" | "hd5" | "hdf5" => Ok(FileType::Hdf),
            other => Err(GridError::UnsupportedExtension(other.to_string())),
        }
    }

    /// Detect the format from the file contents.
    ///
    /// HDF5 files may start with a user block, so the superblock signature
    /// is looked for at offsets 0, 512, 1024, 2048 and so on. Returns
    /// `None` when the file matches neither format.
    pub fn sniff<P: AsRef<Path>>(path: P) -> Result<Option<Self>, GridError> {
        let mut file = fs::File::open(path)?;
        let mut head = Vec::with_capacity(FITS_SIGNATURE.len());
        (&mut file)
            .take(FITS_SIGNATURE.len() as u64)
            .read_to_end(&mut head)?;
        if head == FITS_SIGNATURE {
            return Ok(Some(FileType::Fits));
        }

        let len = file.metadata()?.len();
        let mut offset = 0u64;
        let mut signature = [0u8; 8];
        while offset + signature.len() as u64 <= len {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut signature)?;
            if signature == HDF5_SIGNATURE {
                return Ok(Some(FileType::Hdf));
            }
            offset = if offset == 0 { 512 } else { offset * 2 };
        }
        Ok(None)
    }

    pub fn name(self) -> &'static str {
        match self {
            FileType::Fits => "FITS",
            FileType::Hdf => "HDF5",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn read_lamb(path: &Path, file_type: FileType) -> Result<Array1<f64>, GridError> {
    match file_type {
        FileType::Fits => fits::read_lamb(path),
        FileType::Hdf => hdf::read_lamb(path),
    }
}

pub fn read_seds(path: &Path, file_type: FileType) -> Result<Array2<f64>, GridError> {
    match file_type {
        FileType::Fits => fits::read_seds(path),
        FileType::Hdf => hdf::read_seds(path),
    }
}

/// Read one covariance array (`covdiag` or `covoffdiag`), `None` when the
/// file does not carry it.
pub fn read_covariance(
    path: &Path,
    file_type: FileType,
    name: &str,
) -> Result<Option<Array2<f64>>, GridError> {
    match file_type {
        FileType::Fits => fits::read_covariance(path, name),
        FileType::Hdf => hdf::read_covariance(path, name),
    }
}

pub fn read_table(path: &Path, file_type: FileType) -> Result<ParamTable, GridError> {
    match file_type {
        FileType::Fits => fits::read_table(path),
        FileType::Hdf => hdf::read_table(path),
    }
}

/// Parameter column names without reading the columns
pub fn read_column_names(path: &Path, file_type: FileType) -> Result<Vec<String>, GridError> {
    match file_type {
        FileType::Fits => fits::read_column_names(path),
        FileType::Hdf => hdf::read_column_names(path),
    }
}

pub fn read_header(path: &Path, file_type: FileType) -> Result<(Header, Aliases), GridError> {
    match file_type {
        FileType::Fits => fits::read_header(path),
        FileType::Hdf => hdf::read_header(path),
    }
}

/// Read every field of a grid file
pub fn read_grid(path: &Path, file_type: FileType) -> Result<GridData, GridError> {
    log::debug!("Reading {file_type} grid from {}", path.display());
    match file_type {
        FileType::Fits => fits::read_grid(path),
        FileType::Hdf => hdf::read_grid(path),
    }
}
