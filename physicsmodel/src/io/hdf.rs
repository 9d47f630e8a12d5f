//! HDF5 grid files.
//!
//! Layout:
//! - datasets `lamb` (1-D) and `seds` (models x bands)
//! - optional datasets `covdiag` / `covoffdiag`, one row per model
//! - group `grid`: one 1-D dataset per parameter column. The group
//!   attributes hold the table bookkeeping (`CLASS`, `VERSION`, `NROWS`,
//!   `FIELD_<i>_NAME` giving the column order), the grid header entries and
//!   the aliases as `ALIAS<i> = "alternate=canonical"`.
//!
//! `seds`, the covariances and the columns are chunked with an unlimited
//! first dimension so models can be appended in place.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Dataset, File, Group};
use ndarray::{s, Array1, Array2, ArrayView2};

use super::{COV_DIAG, COV_OFFDIAG, GRID, LAMB, SEDS};
use crate::grid::{
    Aliases, Column, CompleteGrid, Covariance, GridData, GridError, Header, HeaderValue,
    ParamTable,
};

const TABLE_CLASS: &str = "TABLE";
const TABLE_VERSION: &str = "2.7";
const NROWS_ATTR: &str = "NROWS";

/// Rows per chunk of every row-indexed dataset. Also the block size used
/// when models are streamed from one file into another.
pub const CHUNK_ROWS: usize = 1024;

/// Attributes that describe the table layout rather than the grid
const BOOKKEEPING_ATTRS: [&str; 4] = ["NROWS", "VERSION", "CLASS", "EXTNAME"];

fn is_bookkeeping(name: &str) -> bool {
    BOOKKEEPING_ATTRS.contains(&name) || name.starts_with("FIELD")
}

fn field_attr(idx: usize) -> String {
    format!("FIELD_{idx}_NAME")
}

fn read_attr_value(attr: &Attribute) -> Result<Option<HeaderValue>, GridError> {
    if !attr.is_scalar() {
        return Ok(None);
    }
    let value = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => {
            HeaderValue::Str(attr.read_scalar::<VarLenUnicode>()?.as_str().to_string())
        }
        TypeDescriptor::VarLenAscii => {
            HeaderValue::Str(attr.read_scalar::<VarLenAscii>()?.as_str().to_string())
        }
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            HeaderValue::Int(attr.read_scalar::<i64>()?)
        }
        TypeDescriptor::Float(_) => HeaderValue::Float(attr.read_scalar::<f64>()?),
        TypeDescriptor::Boolean => HeaderValue::Bool(attr.read_scalar::<bool>()?),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn to_varlen(text: &str) -> Result<VarLenUnicode, GridError> {
    VarLenUnicode::from_str(text).map_err(|e| GridError::InvalidString(format!("{text:?}: {e}")))
}

fn write_attr(group: &Group, name: &str, value: &HeaderValue) -> Result<(), GridError> {
    match value {
        HeaderValue::Str(text) => group
            .new_attr::<VarLenUnicode>()
            .shape(())
            .create(name)?
            .write_scalar(&to_varlen(text)?)?,
        HeaderValue::Int(v) => group.new_attr::<i64>().shape(()).create(name)?.write_scalar(v)?,
        HeaderValue::Float(v) => group.new_attr::<f64>().shape(()).create(name)?.write_scalar(v)?,
        HeaderValue::Bool(v) => group.new_attr::<bool>().shape(()).create(name)?.write_scalar(v)?,
    }
    Ok(())
}

/// Header and aliases from the table group attributes.
///
/// Layout bookkeeping is dropped, `ALIAS*` entries become aliases and an
/// empty `NAME` is filled from `TITLE`.
pub(crate) fn header_from_group(group: &Group) -> Result<(Header, Aliases), GridError> {
    let mut entries = Vec::new();
    for name in group.attr_names()? {
        if is_bookkeeping(&name) {
            continue;
        }
        match read_attr_value(&group.attr(&name)?)? {
            Some(value) => entries.push((name, value)),
            None => log::warn!("Skipping attribute {name} with unsupported type"),
        }
    }
    let (mut header, aliases) = Header::from_entries(entries);
    header.backfill_name();
    Ok((header, aliases))
}

/// Column names in table order, from the `FIELD_<i>_NAME` attributes.
///
/// Groups written without them fall back to the member names.
pub(crate) fn column_names(group: &Group) -> Result<Vec<String>, GridError> {
    let mut names = Vec::new();
    while let Ok(attr) = group.attr(&field_attr(names.len())) {
        match read_attr_value(&attr)? {
            Some(HeaderValue::Str(name)) => names.push(name),
            _ => {
                return Err(GridError::InvalidString(format!(
                    "{} is not a string",
                    field_attr(names.len())
                )))
            }
        }
    }
    if names.is_empty() {
        names = group.member_names()?;
    }
    Ok(names)
}

fn read_column(dataset: &Dataset, name: &str) -> Result<Option<Column>, GridError> {
    let column = match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::Float(_) => Column::Float(dataset.read_1d::<f64>()?),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            Column::Int(dataset.read_1d::<i64>()?)
        }
        TypeDescriptor::Boolean => Column::Int(dataset.read_1d::<bool>()?.mapv(i64::from)),
        TypeDescriptor::VarLenUnicode => Column::Str(
            dataset
                .read_1d::<VarLenUnicode>()?
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        ),
        TypeDescriptor::VarLenAscii => Column::Str(
            dataset
                .read_1d::<VarLenAscii>()?
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        ),
        other => {
            log::warn!("Skipping column {name} with unsupported type {other:?}");
            return Ok(None);
        }
    };
    Ok(Some(column))
}

/// Read every column of a table group
pub(crate) fn table_from_group(group: &Group) -> Result<ParamTable, GridError> {
    let mut table = ParamTable::new();
    for name in column_names(group)? {
        if let Some(column) = read_column(&group.dataset(&name)?, &name)? {
            table.add_column(&name, column)?;
        }
    }
    Ok(table)
}

fn open_optional_2d(file: &File, name: &str) -> Result<Option<Array2<f64>>, GridError> {
    if file.link_exists(name) {
        Ok(Some(file.dataset(name)?.read_2d::<f64>()?))
    } else {
        Ok(None)
    }
}

pub fn read_lamb(path: &Path) -> Result<Array1<f64>, GridError> {
    Ok(File::open(path)?.dataset(LAMB)?.read_1d::<f64>()?)
}

pub fn read_seds(path: &Path) -> Result<Array2<f64>, GridError> {
    Ok(File::open(path)?.dataset(SEDS)?.read_2d::<f64>()?)
}

/// Contiguous block of rows of a 2-D dataset, read as a hyperslab.
pub fn read_rows(
    dataset: &Dataset,
    rows: std::ops::Range<usize>,
) -> Result<Array2<f64>, GridError> {
    Ok(dataset.read_slice_2d::<f64, _>(s![rows.start..rows.end, ..])?)
}

pub fn read_covariance(path: &Path, name: &str) -> Result<Option<Array2<f64>>, GridError> {
    open_optional_2d(&File::open(path)?, name)
}

pub fn read_table(path: &Path) -> Result<ParamTable, GridError> {
    table_from_group(&File::open(path)?.group(GRID)?)
}

/// Column names from the table attributes, without reading the columns.
pub fn read_column_names(path: &Path) -> Result<Vec<String>, GridError> {
    column_names(&File::open(path)?.group(GRID)?)
}

pub fn read_header(path: &Path) -> Result<(Header, Aliases), GridError> {
    header_from_group(&File::open(path)?.group(GRID)?)
}

/// Read a whole grid file.
///
/// Covariances are kept only when both datasets exist.
pub fn read_grid(path: &Path) -> Result<GridData, GridError> {
    let file = File::open(path)?;
    let lamb = file.dataset(LAMB)?.read_1d::<f64>()?;
    let seds = file.dataset(SEDS)?.read_2d::<f64>()?;
    let covariance = match (
        open_optional_2d(&file, COV_DIAG)?,
        open_optional_2d(&file, COV_OFFDIAG)?,
    ) {
        (Some(diag), Some(offdiag)) => Some(Covariance { diag, offdiag }),
        (None, None) => None,
        _ => {
            log::warn!(
                "{} carries only one covariance term, ignoring it",
                path.display()
            );
            None
        }
    };
    let group = file.group(GRID)?;
    let grid = table_from_group(&group)?;
    let (header, aliases) = header_from_group(&group)?;

    Ok(GridData {
        lamb,
        seds,
        grid,
        covariance,
        header,
        aliases,
    })
}

/// Resizable dataset of `ncols` wide rows, starting empty
fn create_rows(file: &File, name: &str, ncols: usize) -> Result<Dataset, GridError> {
    Ok(file
        .new_dataset::<f64>()
        .shape((0_usize.., ncols))
        .chunk((CHUNK_ROWS, ncols.max(1)))
        .create(name)?)
}

/// Resizable 1-D dataset typed after `column`, starting empty
fn create_column(group: &Group, name: &str, column: &Column) -> Result<Dataset, GridError> {
    let builder = match column {
        Column::Float(_) => group.new_dataset::<f64>(),
        Column::Int(_) => group.new_dataset::<i64>(),
        Column::Str(_) => group.new_dataset::<VarLenUnicode>(),
    };
    Ok(builder
        .shape((0_usize..,))
        .chunk((CHUNK_ROWS,))
        .create(name)?)
}

fn require_resizable(dataset: &Dataset, path: &Path) -> Result<(), GridError> {
    if dataset.is_resizable() {
        Ok(())
    } else {
        Err(GridError::Shape(format!(
            "{} in {} has a fixed size and cannot be appended to",
            dataset.name(),
            path.display()
        )))
    }
}

fn check_column_type(dataset: &Dataset, name: &str, column: &Column) -> Result<(), GridError> {
    let stored = match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::Float(_) => "float",
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => "int",
        TypeDescriptor::VarLenUnicode => "str",
        _ => "unsupported",
    };
    if stored == column.type_name() {
        Ok(())
    } else {
        Err(GridError::ColumnType {
            column: name.to_string(),
            expected: stored,
            found: column.type_name(),
        })
    }
}

/// Grow a 2-D dataset along its first axis and write `rows` at the end.
fn extend_rows(dataset: &Dataset, rows: ArrayView2<'_, f64>) -> Result<(), GridError> {
    let (start, width) = match dataset.shape().as_slice() {
        [nrows, ncols] => (*nrows, *ncols),
        other => return Err(GridError::Shape(format!("{} has shape {other:?}", dataset.name()))),
    };
    if rows.ncols() != width {
        return Err(GridError::LengthMismatch {
            what: format!("columns of {}", dataset.name()),
            expected: width,
            found: rows.ncols(),
        });
    }
    if rows.nrows() == 0 {
        return Ok(());
    }
    let end = start + rows.nrows();
    let rows = rows.as_standard_layout();
    dataset.resize((end, width))?;
    dataset.write_slice(rows.view(), s![start..end, ..])?;
    Ok(())
}

/// Grow a column dataset and write the values of `column` at the end.
fn extend_column(dataset: &Dataset, column: &Column) -> Result<(), GridError> {
    if column.is_empty() {
        return Ok(());
    }
    let start = dataset.shape().first().copied().unwrap_or(0);
    let end = start + column.len();
    dataset.resize((end,))?;
    match column {
        Column::Float(values) => dataset.write_slice(values.view(), start..end)?,
        Column::Int(values) => dataset.write_slice(values.view(), start..end)?,
        Column::Str(values) => {
            let encoded = values
                .iter()
                .map(|s| to_varlen(s))
                .collect::<Result<Array1<VarLenUnicode>, GridError>>()?;
            dataset.write_slice(encoded.view(), start..end)?
        }
    }
    Ok(())
}

/// Next free `ALIAS<i>` index among the group attributes
fn next_alias_index(names: &[String]) -> usize {
    names
        .iter()
        .filter_map(|name| name.strip_prefix("ALIAS")?.parse::<usize>().ok())
        .map(|idx| idx + 1)
        .max()
        .unwrap_or(0)
}

/// Streams models into an HDF5 grid file.
///
/// Every row-indexed dataset is chunked with an unlimited first dimension,
/// so appending resizes the datasets and writes the new rows as a
/// hyperslab; rows already in the file are never read or rewritten. SED
/// and covariance rows can be pushed in blocks, the table rows are pushed
/// separately and [`GridAppender::finish`] checks that both counts agree.
#[derive(Debug)]
pub struct GridAppender {
    path: PathBuf,
    seds: Dataset,
    covariance: Option<(Dataset, Dataset)>,
    group: Group,
    columns: Vec<(String, Dataset)>,
    existing: usize,
    seds_rows: usize,
    table_rows: usize,
    // Keeps the file open for the lifetime of the handles above
    _file: File,
}

impl GridAppender {
    /// Create a new, empty grid file, replacing any existing one.
    ///
    /// `table` only provides the column names and types here, its rows are
    /// written with [`GridAppender::push_table`]. `covariance` gives the
    /// widths of the diagonal and off-diagonal terms.
    pub fn create(
        path: &Path,
        lamb: &Array1<f64>,
        table: &ParamTable,
        covariance: Option<(usize, usize)>,
    ) -> Result<Self, GridError> {
        let file = File::create(path)?;
        file.new_dataset_builder().with_data(lamb).create(LAMB)?;
        let seds = create_rows(&file, SEDS, lamb.len())?;
        let covariance = match covariance {
            Some((ndiag, noffdiag)) => Some((
                create_rows(&file, COV_DIAG, ndiag)?,
                create_rows(&file, COV_OFFDIAG, noffdiag)?,
            )),
            None => None,
        };

        let group = file.create_group(GRID)?;
        let mut columns = Vec::with_capacity(table.num_columns());
        for (name, column) in table.iter() {
            columns.push((name.to_string(), create_column(&group, name, column)?));
        }
        write_attr(&group, "CLASS", &HeaderValue::from(TABLE_CLASS))?;
        write_attr(&group, "VERSION", &HeaderValue::from(TABLE_VERSION))?;
        write_attr(&group, NROWS_ATTR, &HeaderValue::Int(0))?;
        for (idx, name) in table.names().iter().enumerate() {
            write_attr(&group, &field_attr(idx), &HeaderValue::from(name.as_str()))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            seds,
            covariance,
            group,
            columns,
            existing: 0,
            seds_rows: 0,
            table_rows: 0,
            _file: file,
        })
    }

    /// Open an existing grid file for appending.
    ///
    /// # Errors
    /// * `GridError::LengthMismatch` - `nbands` differs from the stored wavelengths
    /// * `GridError::SchemaMismatch` - the table columns differ
    /// * `GridError::ColumnType` - a column is stored with another type
    /// * `GridError::Shape` - fixed-size datasets, or covariances on only one side
    pub fn open(
        path: &Path,
        nbands: usize,
        table: &ParamTable,
        covariance: Option<(usize, usize)>,
    ) -> Result<Self, GridError> {
        let file = File::open_rw(path)?;
        let stored_bands = file.dataset(LAMB)?.shape().first().copied().unwrap_or(0);
        if stored_bands != nbands {
            return Err(GridError::LengthMismatch {
                what: "wavelengths of appended grid".to_string(),
                expected: stored_bands,
                found: nbands,
            });
        }

        let seds = file.dataset(SEDS)?;
        require_resizable(&seds, path)?;
        let stored_cov = file.link_exists(COV_DIAG) && file.link_exists(COV_OFFDIAG);
        let covariance = match (stored_cov, covariance) {
            (true, Some(_)) => {
                let diag = file.dataset(COV_DIAG)?;
                let offdiag = file.dataset(COV_OFFDIAG)?;
                require_resizable(&diag, path)?;
                require_resizable(&offdiag, path)?;
                Some((diag, offdiag))
            }
            (false, None) => None,
            (stored, _) => {
                return Err(GridError::Shape(format!(
                    "covariance {} in {} but {} in the appended models",
                    if stored { "present" } else { "absent" },
                    path.display(),
                    if stored { "absent" } else { "present" },
                )))
            }
        };

        let group = file.group(GRID)?;
        let names = column_names(&group)?;
        if names != table.names() {
            return Err(GridError::SchemaMismatch {
                expected: names.join(","),
                found: table.names().join(","),
            });
        }
        let mut columns = Vec::with_capacity(names.len());
        for (name, column) in table.iter() {
            let dataset = group.dataset(name)?;
            require_resizable(&dataset, path)?;
            check_column_type(&dataset, name, column)?;
            columns.push((name.to_string(), dataset));
        }

        let existing = seds.shape().first().copied().unwrap_or(0);
        log::debug!("Appending to {} models in {}", existing, path.display());
        Ok(Self {
            path: path.to_path_buf(),
            seds,
            covariance,
            group,
            columns,
            existing,
            seds_rows: 0,
            table_rows: 0,
            _file: file,
        })
    }

    /// Append a block of SED rows, with the matching covariance rows when
    /// the file carries covariances.
    pub fn push_seds(
        &mut self,
        seds: ArrayView2<'_, f64>,
        covariance: Option<(ArrayView2<'_, f64>, ArrayView2<'_, f64>)>,
    ) -> Result<(), GridError> {
        match (&self.covariance, covariance) {
            (Some((diag_ds, offdiag_ds)), Some((diag, offdiag))) => {
                for (what, cov) in [
                    ("covdiag rows", diag.view()),
                    ("covoffdiag rows", offdiag.view()),
                ] {
                    if cov.nrows() != seds.nrows() {
                        return Err(GridError::LengthMismatch {
                            what: what.to_string(),
                            expected: seds.nrows(),
                            found: cov.nrows(),
                        });
                    }
                }
                extend_rows(&self.seds, seds)?;
                extend_rows(diag_ds, diag)?;
                extend_rows(offdiag_ds, offdiag)?;
            }
            (None, None) => extend_rows(&self.seds, seds)?,
            _ => {
                return Err(GridError::Shape(
                    "covariance rows must be pushed exactly when the file has covariances"
                        .to_string(),
                ))
            }
        }
        self.seds_rows += seds.nrows();
        Ok(())
    }

    /// Append the rows of a table with the columns the file was opened with.
    pub fn push_table(&mut self, table: &ParamTable) -> Result<(), GridError> {
        let names: Vec<&str> = self.columns.iter().map(|(name, _)| name.as_str()).collect();
        if names != table.names() {
            return Err(GridError::SchemaMismatch {
                expected: names.join(","),
                found: table.names().join(","),
            });
        }
        for ((name, dataset), (_, column)) in self.columns.iter().zip(table.iter()) {
            check_column_type(dataset, name, column)?;
            extend_column(dataset, column)?;
        }
        self.table_rows += table.len();
        Ok(())
    }

    /// Update `NROWS`, record header entries and aliases the file does not
    /// hold yet, and close the file. Returns the total number of models.
    ///
    /// Header keys already present in the file keep their stored value.
    pub fn finish(self, header: &Header, aliases: &Aliases) -> Result<usize, GridError> {
        if !self.columns.is_empty() && self.table_rows != self.seds_rows {
            return Err(GridError::LengthMismatch {
                what: "parameter table rows".to_string(),
                expected: self.seds_rows,
                found: self.table_rows,
            });
        }
        let nrows = self.existing + self.seds_rows;
        let present = self.group.attr_names()?;
        if present.iter().any(|name| name == NROWS_ATTR) {
            self.group.attr(NROWS_ATTR)?.write_scalar(&(nrows as i64))?;
        } else {
            write_attr(&self.group, NROWS_ATTR, &HeaderValue::Int(nrows as i64))?;
        }

        for (key, value) in header.iter() {
            if is_bookkeeping(key) || key.starts_with("ALIAS") {
                log::warn!("Not writing reserved header key {key}");
                continue;
            }
            if present.contains(key) {
                log::debug!("Keeping stored header entry {key}");
                continue;
            }
            write_attr(&self.group, key, value)?;
        }

        let (_, stored_aliases) = header_from_group(&self.group)?;
        let mut idx = next_alias_index(&present);
        for (alternate, canonical) in aliases.iter() {
            if stored_aliases.contains_key(alternate) {
                continue;
            }
            write_attr(
                &self.group,
                &format!("ALIAS{idx}"),
                &HeaderValue::Str(format!("{alternate}={canonical}")),
            )?;
            idx += 1;
        }

        log::info!(
            "Wrote {} models to {} ({} in total)",
            self.seds_rows,
            self.path.display(),
            nrows
        );
        Ok(nrows)
    }
}

fn covariance_widths(grid: &CompleteGrid<'_>) -> Option<(usize, usize)> {
    grid.covariance
        .map(|(diag, offdiag)| (diag.ncols(), offdiag.ncols()))
}

fn push_complete(mut appender: GridAppender, grid: &CompleteGrid<'_>) -> Result<usize, GridError> {
    appender.push_seds(
        grid.seds.view(),
        grid.covariance.map(|(diag, offdiag)| (diag.view(), offdiag.view())),
    )?;
    appender.push_table(grid.grid)?;
    appender.finish(grid.header, grid.aliases)
}

/// Write a complete grid to a new HDF5 file, replacing any existing one.
pub fn write_grid(path: &Path, grid: &CompleteGrid<'_>) -> Result<(), GridError> {
    grid.check_shapes()?;
    let appender = GridAppender::create(path, grid.lamb, grid.grid, covariance_widths(grid))?;
    push_complete(appender, grid)?;
    Ok(())
}

/// Append the models of `grid` to an existing HDF5 grid file.
///
/// The wavelengths must match in length and the table columns in name and
/// type. SEDs, covariances and every column grow in place; the stored
/// wavelengths and header entries are kept. A missing target file is
/// simply written.
pub fn append_grid(path: &Path, grid: &CompleteGrid<'_>) -> Result<(), GridError> {
    if !path.exists() {
        return write_grid(path, grid);
    }
    grid.check_shapes()?;
    let appender = GridAppender::open(path, grid.lamb.len(), grid.grid, covariance_widths(grid))?;
    push_complete(appender, grid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    fn sample() -> GridData {
        let grid = ParamTable::new()
            .with_column("M_ini", Column::Float(array![0.5, 1.0]))
            .unwrap()
            .with_column("stage", Column::Int(array![1, 2]))
            .unwrap()
            .with_column("label", Column::Str(vec!["ms".into(), "rgb".into()]))
            .unwrap();
        let mut header = Header::new();
        header.insert("TITLE", "unit test grid");
        header.set_filters(&["F275W", "F814W"]);
        header.insert("distance", 7.76e5);
        let mut aliases = Aliases::new();
        aliases.insert("mass".to_string(), "M_ini".to_string());
        GridData {
            lamb: array![2750.0, 8140.0],
            seds: array![[1.0, 2.0], [3.0, 4.0]],
            grid,
            covariance: None,
            header,
            aliases,
        }
    }

    fn complete(data: &GridData) -> CompleteGrid<'_> {
        CompleteGrid {
            lamb: &data.lamb,
            seds: &data.seds,
            grid: &data.grid,
            covariance: data.covariance.as_ref().map(|c| (&c.diag, &c.offdiag)),
            header: &data.header,
            aliases: &data.aliases,
        }
    }

    #[test]
    fn test_bookkeeping_attrs() {
        assert!(is_bookkeeping("NROWS"));
        assert!(is_bookkeeping("FIELD_3_NAME"));
        assert!(is_bookkeeping("FIELD_0_FILL"));
        assert!(!is_bookkeeping("NAME"));
        assert!(!is_bookkeeping("filters"));
    }

    #[test]
    fn test_hdf_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.hdf5");
        let data = sample();

        write_grid(&path, &complete(&data)).unwrap();
        let back = read_grid(&path).unwrap();

        assert_eq!(back.lamb, data.lamb);
        assert_eq!(back.seds, data.seds);
        assert_eq!(back.grid, data.grid);
        assert_eq!(back.header.filters().unwrap(), vec!["F275W", "F814W"]);
        assert_eq!(back.header.get("distance"), Some(&HeaderValue::Float(7.76e5)));
        assert_eq!(
            back.header.get("NAME"),
            Some(&HeaderValue::from("unit test grid"))
        );
        assert!(!back.header.contains_key("NROWS"));
        assert_eq!(back.aliases.get("mass"), Some(&"M_ini".to_string()));
        assert_eq!(read_column_names(&path).unwrap(), vec!["M_ini", "stage", "label"]);
    }

    #[test]
    fn test_append_extends_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("append.hdf5");
        let data = sample();

        append_grid(&path, &complete(&data)).unwrap();
        append_grid(&path, &complete(&data)).unwrap();

        let back = read_grid(&path).unwrap();
        assert_eq!(back.seds.nrows(), 4);
        assert_eq!(back.grid.len(), 4);
        assert_eq!(back.lamb, data.lamb);
        assert_eq!(
            back.grid.numeric_column("M_ini").unwrap(),
            array![0.5, 1.0, 0.5, 1.0]
        );
    }

    #[test]
    fn test_append_rejects_band_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bands.hdf5");
        let data = sample();
        write_grid(&path, &complete(&data)).unwrap();

        let mut other = sample();
        other.lamb = array![1.0, 2.0, 3.0];
        other.seds = Array2::zeros((2, 3));
        assert!(matches!(
            append_grid(&path, &complete(&other)),
            Err(GridError::LengthMismatch { .. })
        ));
    }

    fn seds_bits(path: &Path) -> Vec<u64> {
        read_grid(path).unwrap().seds.iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn test_append_leaves_stored_rows_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grow.hdf5");
        let mut data = sample();
        data.seds = array![[0.1 + 0.2, 1.0 / 3.0], [f64::MIN_POSITIVE, 2.0_f64.sqrt()]];
        data.covariance = Some(Covariance {
            diag: array![[0.3, 0.4], [0.5, 0.6]],
            offdiag: array![[0.01], [0.02]],
        });
        write_grid(&path, &complete(&data)).unwrap();
        let before = seds_bits(&path);

        let mut more = data.clone();
        more.seds = array![[9.0, 8.0], [7.0, 6.0]];
        append_grid(&path, &complete(&more)).unwrap();
        append_grid(&path, &complete(&more)).unwrap();

        let after = seds_bits(&path);
        assert_eq!(after.len(), 12);
        assert_eq!(&after[..4], before.as_slice());

        let file = File::open(&path).unwrap();
        for name in [SEDS, COV_DIAG, COV_OFFDIAG] {
            let dataset = file.dataset(name).unwrap();
            assert!(dataset.is_resizable());
            assert!(dataset.is_chunked());
            assert_eq!(dataset.shape()[0], 6);
        }
        let group = file.group(GRID).unwrap();
        assert_eq!(group.dataset("label").unwrap().shape(), vec![6]);
        assert_eq!(group.attr(NROWS_ATTR).unwrap().read_scalar::<i64>().unwrap(), 6);

        let back = read_grid(&path).unwrap();
        let offdiag = back.covariance.unwrap().offdiag;
        assert_eq!(offdiag.column(0).to_vec(), [0.01, 0.02].repeat(3));
        assert_eq!(back.grid.column("stage"), Some(&Column::Int(array![1, 2, 1, 2, 1, 2])));
    }

    #[test]
    fn test_append_keeps_stored_header_and_adds_new_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("header.hdf5");
        let data = sample();
        write_grid(&path, &complete(&data)).unwrap();

        let mut more = sample();
        more.header.insert("distance", 1.0);
        more.header.insert("NISO", 3i64);
        more.aliases.insert("age".to_string(), "logA".to_string());
        append_grid(&path, &complete(&more)).unwrap();

        let (header, aliases) = read_header(&path).unwrap();
        assert_eq!(header.get("distance"), Some(&HeaderValue::Float(7.76e5)));
        assert_eq!(header.get("NISO"), Some(&HeaderValue::Int(3)));
        assert_eq!(aliases.get("mass"), Some(&"M_ini".to_string()));
        assert_eq!(aliases.get("age"), Some(&"logA".to_string()));
    }

    #[test]
    fn test_append_rejects_other_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema.hdf5");
        let data = sample();
        write_grid(&path, &complete(&data)).unwrap();

        let mut renamed = sample();
        renamed.grid = ParamTable::new()
            .with_column("M_act", Column::Float(array![0.5, 1.0]))
            .unwrap();
        assert!(matches!(
            append_grid(&path, &complete(&renamed)),
            Err(GridError::SchemaMismatch { .. })
        ));

        let mut retyped = sample();
        retyped.grid = ParamTable::new()
            .with_column("M_ini", Column::Int(array![1, 2]))
            .unwrap()
            .with_column("stage", Column::Int(array![1, 2]))
            .unwrap()
            .with_column("label", Column::Str(vec!["ms".into(), "rgb".into()]))
            .unwrap();
        assert!(matches!(
            append_grid(&path, &complete(&retyped)),
            Err(GridError::ColumnType { .. })
        ));

        let mut with_cov = sample();
        with_cov.covariance = Some(Covariance {
            diag: Array2::zeros((2, 2)),
            offdiag: Array2::zeros((2, 1)),
        });
        assert!(matches!(
            append_grid(&path, &complete(&with_cov)),
            Err(GridError::Shape(_))
        ));
        assert_eq!(read_grid(&path).unwrap().seds.nrows(), 2);
    }

    #[test]
    fn test_append_rejects_fixed_size_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixed.hdf5");
        let data = sample();
        {
            let file = File::create(&path).unwrap();
            file.new_dataset_builder().with_data(&data.lamb).create(LAMB).unwrap();
            file.new_dataset_builder().with_data(&data.seds).create(SEDS).unwrap();
            file.create_group(GRID).unwrap();
        }
        let empty = GridData {
            grid: ParamTable::new(),
            ..sample()
        };
        assert!(matches!(
            append_grid(&path, &complete(&empty)),
            Err(GridError::Shape(_))
        ));
    }

    #[test]
    fn test_next_alias_index() {
        assert_eq!(next_alias_index(&[]), 0);
        let names = ["ALIAS0", "NAME", "ALIAS3", "ALIASX"].map(String::from);
        assert_eq!(next_alias_index(&names), 4);
    }
}
