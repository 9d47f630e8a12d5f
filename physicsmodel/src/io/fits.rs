//! FITS grid files.
//!
//! Layout written by [`write_grid`]:
//! - primary HDU: 1-D `lamb` image
//! - `seds`: 2-D image, one row per model
//! - `covdiag` / `covoffdiag`: optional 2-D images, one row per model
//! - `grid`: binary table with one column per parameter, the grid header
//!   stored as keywords on this HDU
//!
//! Older grids have no `seds` extension. Their primary HDU stacks the SEDs
//! with the wavelengths as the last row and the parameter table is the
//! first binary table; both layouts are read transparently.
//!
//! Header keywords are written and enumerated through the raw CFITSIO
//! wrappers of the `fits_keys` module.

use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use ndarray::{s, Array1, Array2};

use super::fits_keys::{read_cards, write_keyword};
use super::{COV_DIAG, COV_OFFDIAG, GRID, SEDS};
use crate::grid::{
    Aliases, Column, CompleteGrid, Covariance, GridData, GridError, Header, HeaderValue,
    ParamTable,
};

/// Keys describing the HDU structure itself; never part of the grid header.
const STRUCTURAL_KEYS: [&str; 13] = [
    "SIMPLE", "BITPIX", "EXTEND", "XTENSION", "PCOUNT", "GCOUNT", "TFIELDS", "EXTNAME",
    "LONGSTRN", "BSCALE", "BZERO", "CHECKSUM", "DATASUM",
];

/// Indexed structural keys (`NAXIS1`, `TTYPE3`, ...)
const STRUCTURAL_PREFIXES: [&str; 9] = [
    "NAXIS", "TTYPE", "TFORM", "TUNIT", "TDIM", "TNULL", "TSCAL", "TZERO", "TDISP",
];

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key)
        || STRUCTURAL_PREFIXES.iter().any(|prefix| {
            key.strip_prefix(prefix)
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        })
}

fn has_hdu(f: &mut FitsFile, name: &str) -> bool {
    f.hdu(name).is_ok()
}

/// The parameter table HDU: `grid` when present, otherwise the first table.
///
/// The returned HDU is left as the current HDU of `f`.
fn table_hdu(f: &mut FitsFile) -> Result<FitsHdu, GridError> {
    if let Ok(hdu) = f.hdu(GRID) {
        if matches!(hdu.info, HduInfo::TableInfo { .. }) {
            return Ok(hdu);
        }
    }
    let mut idx: usize = 1;
    while let Ok(hdu) = f.hdu(idx) {
        if matches!(hdu.info, HduInfo::TableInfo { .. }) {
            return Ok(hdu);
        }
        idx += 1;
    }
    Err(GridError::Shape(
        "no binary table holding the parameter table".to_string(),
    ))
}

fn read_image_2d(f: &mut FitsFile, hdu: &FitsHdu, name: &str) -> Result<Array2<f64>, GridError> {
    let (nrows, ncols) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => match shape.as_slice() {
            [nrows, ncols] => (*nrows, *ncols),
            [ncols] => (1, *ncols),
            [] => (0, 0),
            other => {
                return Err(GridError::Shape(format!(
                    "HDU '{name}' has {} axes, expected at most 2",
                    other.len()
                )))
            }
        },
        _ => return Err(GridError::Shape(format!("HDU '{name}' is not an image"))),
    };

    if nrows * ncols == 0 {
        return Ok(Array2::zeros((nrows, ncols)));
    }

    let data: Vec<f64> = hdu.read_image(f)?;
    Array2::from_shape_vec((nrows, ncols), data)
        .map_err(|e| GridError::Shape(format!("cannot reshape HDU '{name}': {e}")))
}

fn read_image_1d(f: &mut FitsFile, hdu: &FitsHdu, name: &str) -> Result<Array1<f64>, GridError> {
    let image = read_image_2d(f, hdu, name)?;
    if image.nrows() > 1 {
        return Err(GridError::Shape(format!(
            "HDU '{name}' is {:?}, expected a 1-D image",
            image.dim()
        )));
    }
    Ok(image.iter().copied().collect())
}

/// Split a legacy primary image into (wavelengths, SEDs).
fn read_legacy_primary(f: &mut FitsFile) -> Result<(Array1<f64>, Array2<f64>), GridError> {
    let primary = f.primary_hdu()?;
    let stacked = read_image_2d(f, &primary, "PRIMARY")?;
    let nrows = stacked.nrows();
    if nrows == 0 {
        return Err(GridError::Shape(
            "legacy primary HDU holds no wavelength row".to_string(),
        ));
    }
    let lamb = stacked.row(nrows - 1).to_owned();
    let seds = stacked.slice(s![..nrows - 1, ..]).to_owned();
    Ok((lamb, seds))
}

fn load_lamb(f: &mut FitsFile) -> Result<Array1<f64>, GridError> {
    if has_hdu(f, SEDS) {
        let primary = f.primary_hdu()?;
        read_image_1d(f, &primary, "PRIMARY")
    } else {
        log::debug!("No '{SEDS}' extension, reading legacy layout");
        Ok(read_legacy_primary(f)?.0)
    }
}

fn load_seds(f: &mut FitsFile) -> Result<Array2<f64>, GridError> {
    match f.hdu(SEDS) {
        Ok(hdu) => read_image_2d(f, &hdu, SEDS),
        Err(_) => Ok(read_legacy_primary(f)?.1),
    }
}

fn load_covariance(f: &mut FitsFile, name: &str) -> Result<Option<Array2<f64>>, GridError> {
    match f.hdu(name) {
        Ok(hdu) => Ok(Some(read_image_2d(f, &hdu, name)?)),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Float,
    Int,
    Str,
}

fn table_columns(hdu: &FitsHdu) -> Vec<(String, ColumnKind)> {
    match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            ..
        } => column_descriptions
            .iter()
            .map(|desc| {
                let kind = match desc.data_type.typ {
                    ColumnDataType::String => ColumnKind::Str,
                    ColumnDataType::Float | ColumnDataType::Double => ColumnKind::Float,
                    _ => ColumnKind::Int,
                };
                (desc.name.clone(), kind)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn load_table(f: &mut FitsFile) -> Result<ParamTable, GridError> {
    let hdu = table_hdu(f)?;
    let mut table = ParamTable::new();
    for (name, kind) in table_columns(&hdu) {
        let column = match kind {
            ColumnKind::Float => Column::Float(Array1::from(hdu.read_col::<f64>(f, &name)?)),
            ColumnKind::Int => Column::Int(Array1::from(hdu.read_col::<i64>(f, &name)?)),
            ColumnKind::Str => Column::Str(
                hdu.read_col::<String>(f, &name)?
                    .into_iter()
                    .map(|s| s.trim_end().to_string())
                    .collect(),
            ),
        };
        table.add_column(&name, column)?;
    }
    Ok(table)
}

fn load_header(f: &mut FitsFile) -> Result<(Header, Aliases), GridError> {
    table_hdu(f)?;
    let cards = read_cards(f)?;
    let (mut header, aliases) = Header::from_entries(parse_cards(&cards));
    header.backfill_name();
    Ok((header, aliases))
}

/// Parse a quoted FITS string value, returning the unescaped text.
fn parse_string_literal(raw: &str) -> Option<String> {
    let mut chars = raw.trim_start().strip_prefix('\'')?.chars().peekable();
    let mut text = String::new();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                text.push('\'');
            } else {
                return Some(text.trim_end().to_string());
            }
        } else {
            text.push(c);
        }
    }
    None
}

fn parse_scalar(raw: &str) -> Option<HeaderValue> {
    let value = raw.split('/').next().unwrap_or_default().trim();
    match value {
        "T" => return Some(HeaderValue::Bool(true)),
        "F" => return Some(HeaderValue::Bool(false)),
        "" => return None,
        _ => {}
    }
    if let Ok(v) = value.parse::<i64>() {
        return Some(HeaderValue::Int(v));
    }
    value
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .ok()
        .map(HeaderValue::Float)
}

/// Split a card into (keyword, value field). Cards without a value
/// indicator (`COMMENT`, `HISTORY`, blank, `END`) give `None`.
fn split_card(card: &str) -> Option<(String, &str)> {
    if let Some(rest) = card.strip_prefix("HIERARCH ") {
        let (key, value) = rest.split_once('=')?;
        return Some((key.trim().to_string(), value));
    }
    if card.get(8..10) != Some("= ") {
        return None;
    }
    let key = card.get(..8)?.trim();
    Some((key.to_string(), card.get(10..).unwrap_or_default()))
}

/// Turn raw header cards into key/value entries.
///
/// Structural keywords are dropped, `HIERARCH` names are kept in full and
/// `CONTINUE` long strings are reassembled.
pub(crate) fn parse_cards<S: AsRef<str>>(cards: &[S]) -> Vec<(String, HeaderValue)> {
    let mut entries = Vec::new();
    let mut pending: Option<(String, String)> = None;

    for card in cards {
        let card = card.as_ref();

        if let Some(rest) = card.strip_prefix("CONTINUE") {
            if let Some((key, mut text)) = pending.take() {
                match parse_string_literal(rest) {
                    Some(part) => match part.strip_suffix('&') {
                        Some(more) => {
                            text.push_str(more);
                            pending = Some((key, text));
                        }
                        None => {
                            text.push_str(&part);
                            entries.push((key, HeaderValue::Str(text)));
                        }
                    },
                    None => entries.push((key, HeaderValue::Str(text))),
                }
            }
            continue;
        }

        if let Some((key, text)) = pending.take() {
            entries.push((key, HeaderValue::Str(text)));
        }

        let Some((key, raw_value)) = split_card(card) else {
            continue;
        };
        if key.is_empty() || is_structural(&key) {
            continue;
        }

        if raw_value.trim_start().starts_with('\'') {
            match parse_string_literal(raw_value) {
                Some(text) => match text.strip_suffix('&') {
                    Some(head) => pending = Some((key, head.to_string())),
                    None => entries.push((key, HeaderValue::Str(text))),
                },
                None => log::warn!("Skipping unterminated string keyword {key}"),
            }
        } else {
            match parse_scalar(raw_value) {
                Some(value) => entries.push((key, value)),
                None => log::warn!("Skipping unparseable keyword {key}"),
            }
        }
    }

    if let Some((key, text)) = pending {
        entries.push((key, HeaderValue::Str(text)));
    }
    entries
}

pub fn read_lamb(path: &Path) -> Result<Array1<f64>, GridError> {
    let mut f = FitsFile::open(path)?;
    load_lamb(&mut f)
}

pub fn read_seds(path: &Path) -> Result<Array2<f64>, GridError> {
    let mut f = FitsFile::open(path)?;
    load_seds(&mut f)
}

pub fn read_covariance(path: &Path, name: &str) -> Result<Option<Array2<f64>>, GridError> {
    let mut f = FitsFile::open(path)?;
    load_covariance(&mut f, name)
}

pub fn read_table(path: &Path) -> Result<ParamTable, GridError> {
    let mut f = FitsFile::open(path)?;
    load_table(&mut f)
}

/// Column names from the table description, without reading any rows.
pub fn read_column_names(path: &Path) -> Result<Vec<String>, GridError> {
    let mut f = FitsFile::open(path)?;
    let hdu = table_hdu(&mut f)?;
    Ok(table_columns(&hdu).into_iter().map(|(name, _)| name).collect())
}

/// Header keywords of the parameter table HDU
pub fn read_header(path: &Path) -> Result<(Header, Aliases), GridError> {
    let mut f = FitsFile::open(path)?;
    load_header(&mut f)
}

/// Read a whole grid file.
///
/// Covariances are kept only when both arrays are present.
pub fn read_grid(path: &Path) -> Result<GridData, GridError> {
    let mut f = FitsFile::open(path)?;
    let lamb = load_lamb(&mut f)?;
    let seds = load_seds(&mut f)?;
    let covariance = match (
        load_covariance(&mut f, COV_DIAG)?,
        load_covariance(&mut f, COV_OFFDIAG)?,
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
    let grid = load_table(&mut f)?;
    let (header, aliases) = load_header(&mut f)?;

    Ok(GridData {
        lamb,
        seds,
        grid,
        covariance,
        header,
        aliases,
    })
}

fn write_image_2d(f: &mut FitsFile, name: &str, data: &Array2<f64>) -> Result<(), GridError> {
    let (nrows, ncols) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[nrows, ncols],
    };
    let hdu = f.create_image(name, &description)?;
    if !data.is_empty() {
        let flat: Vec<f64> = data.iter().copied().collect();
        hdu.write_image(f, &flat)?;
    }
    Ok(())
}

fn write_table(f: &mut FitsFile, table: &ParamTable) -> Result<(), GridError> {
    let mut descriptions = Vec::with_capacity(table.num_columns());
    for (name, column) in table.iter() {
        let description = match column {
            Column::Float(_) => ColumnDescription::new(name)
                .with_type(ColumnDataType::Double)
                .create()?,
            Column::Int(_) => ColumnDescription::new(name)
                .with_type(ColumnDataType::Int)
                .create()?,
            Column::Str(values) => {
                let width = values.iter().map(String::len).max().unwrap_or(0).max(1);
                ColumnDescription::new(name)
                    .with_type(ColumnDataType::String)
                    .that_repeats(width)
                    .create()?
            }
        };
        descriptions.push(description);
    }

    let hdu = f.create_table(GRID, &descriptions)?;
    if table.is_empty() {
        return Ok(());
    }

    for (name, column) in table.iter() {
        match column {
            Column::Float(values) => {
                hdu.write_col(f, name, &values.to_vec())?;
            }
            Column::Int(values) => {
                let narrowed = values
                    .iter()
                    .map(|&v| {
                        i32::try_from(v).map_err(|_| {
                            GridError::Shape(format!(
                                "column '{name}' value {v} does not fit a FITS 32-bit integer"
                            ))
                        })
                    })
                    .collect::<Result<Vec<i32>, GridError>>()?;
                hdu.write_col(f, name, &narrowed)?;
            }
            Column::Str(values) => {
                hdu.write_col(f, name, values)?;
            }
        }
    }
    Ok(())
}

fn write_header(f: &mut FitsFile, header: &Header, aliases: &Aliases) -> Result<(), GridError> {
    f.hdu(GRID)?;

    for (key, value) in header.iter() {
        if is_structural(key) || key.starts_with("ALIAS") {
            log::warn!("Not writing reserved header key {key}");
            continue;
        }
        write_keyword(f, key, value)?;
    }
    for (idx, (alternate, canonical)) in aliases.iter().enumerate() {
        let value = HeaderValue::Str(format!("{alternate}={canonical}"));
        write_keyword(f, &format!("ALIAS{idx}"), &value)?;
    }
    Ok(())
}

/// Write a complete grid to a FITS file.
///
/// # Arguments
/// * `path` - Output file
/// * `grid` - Grid with shapes already checked
/// * `overwrite` - Replace an existing file instead of failing
pub fn write_grid(path: &Path, grid: &CompleteGrid<'_>, overwrite: bool) -> Result<(), GridError> {
    let lamb = grid.lamb.to_vec();
    let primary = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[lamb.len()],
    };
    let builder = FitsFile::create(path).with_custom_primary(&primary);
    let mut f = if overwrite {
        builder.overwrite().open()?
    } else {
        builder.open()?
    };

    let primary_hdu = f.primary_hdu()?;
    if !lamb.is_empty() {
        primary_hdu.write_image(&mut f, &lamb)?;
    }

    write_image_2d(&mut f, SEDS, grid.seds)?;
    if let Some((diag, offdiag)) = grid.covariance {
        write_image_2d(&mut f, COV_DIAG, diag)?;
        write_image_2d(&mut f, COV_OFFDIAG, offdiag)?;
    }
    write_table(&mut f, grid.grid)?;
    write_header(&mut f, grid.header, grid.aliases)?;

    log::info!(
        "Wrote {} models x {} bands to {}",
        grid.seds.nrows(),
        grid.lamb.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use tempfile::TempDir;

    fn card(text: &str) -> String {
        format!("{text:<80}")
    }

    #[test]
    fn test_structural_keys() {
        assert!(is_structural("NAXIS"));
        assert!(is_structural("NAXIS2"));
        assert!(is_structural("TTYPE12"));
        assert!(is_structural("EXTNAME"));
        assert!(!is_structural("TTYPEX"));
        assert!(!is_structural("NAME"));
        assert!(!is_structural("filters"));
    }

    #[test]
    fn test_parse_simple_cards() {
        let cards = [
            card("XTENSION= 'BINTABLE'           / binary table extension"),
            card("NAXIS2  =                   10 / number of rows"),
            card("NAME    = 'padova'"),
            card("NMODELS =                  250"),
            card("DISTANCE=              7.8D+05 / pc"),
            card("SCALE   =                 0.25"),
            card("USEDUST =                    T"),
            card("COMMENT this is ignored"),
            card("END"),
        ];
        let entries = parse_cards(&cards);

        assert_eq!(
            entries,
            vec![
                ("NAME".to_string(), HeaderValue::from("padova")),
                ("NMODELS".to_string(), HeaderValue::Int(250)),
                ("DISTANCE".to_string(), HeaderValue::Float(7.8e5)),
                ("SCALE".to_string(), HeaderValue::Float(0.25)),
                ("USEDUST".to_string(), HeaderValue::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_parse_quotes_and_hierarch() {
        let cards = [
            card("TITLE   = 'Bob''s grid'"),
            card("HIERARCH filters = 'F275W F814W' / band names"),
        ];
        let entries = parse_cards(&cards);
        assert_eq!(entries[0].1, HeaderValue::from("Bob's grid"));
        assert_eq!(entries[1].0, "filters");
        assert_eq!(entries[1].1, HeaderValue::from("F275W F814W"));
    }

    #[test]
    fn test_parse_continued_string() {
        let cards = [
            card("FILTERS = 'HST_WFC3_F275W HST_WFC3_F336W HST_ACS_WFC_F475W &'"),
            card("CONTINUE  'HST_ACS_WFC_F814W &'"),
            card("CONTINUE  'HST_WFC3_F110W'"),
            card("NAME    = 'after'"),
        ];
        let entries = parse_cards(&cards);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].1,
            HeaderValue::from(
                "HST_WFC3_F275W HST_WFC3_F336W HST_ACS_WFC_F475W HST_ACS_WFC_F814W HST_WFC3_F110W"
            )
        );
    }

    fn sample_grid() -> GridData {
        let grid = ParamTable::new()
            .with_column("logA", Column::Float(array![6.0, 7.0, 8.0]))
            .unwrap()
            .with_column("stage", Column::Int(array![0, 1, 5]))
            .unwrap()
            .with_column(
                "label",
                Column::Str(vec!["ms".into(), "rgb".into(), "agb".into()]),
            )
            .unwrap();
        let mut header = Header::new();
        header.insert("NAME", "test grid");
        header.set_filters(&["HST_WFC3_F275W", "HST_ACS_WFC_F814W"]);
        let mut aliases = Aliases::new();
        aliases.insert("age".to_string(), "logA".to_string());

        GridData {
            lamb: array![2750.0, 8140.0],
            seds: array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
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
    fn test_fits_grid_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.fits");
        let data = sample_grid();

        write_grid(&path, &complete(&data), false).unwrap();
        let back = read_grid(&path).unwrap();

        assert_eq!(back.lamb, data.lamb);
        assert_eq!(back.seds, data.seds);
        assert_eq!(back.grid, data.grid);
        assert!(back.covariance.is_none());
        assert_eq!(
            back.header.filters().unwrap(),
            vec!["HST_WFC3_F275W", "HST_ACS_WFC_F814W"]
        );
        assert_eq!(back.header.get("NAME"), Some(&HeaderValue::from("test grid")));
        assert_eq!(back.aliases.get("age"), Some(&"logA".to_string()));
        assert_eq!(read_column_names(&path).unwrap(), vec!["logA", "stage", "label"]);
    }

    #[test]
    fn test_fits_covariance_written_in_pairs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cov.fits");
        let mut data = sample_grid();
        data.covariance = Some(Covariance {
            diag: Array2::from_elem((3, 2), 0.5),
            offdiag: Array2::from_elem((3, 1), -0.25),
        });

        write_grid(&path, &complete(&data), false).unwrap();
        let diag = read_covariance(&path, COV_DIAG).unwrap().unwrap();
        let offdiag = read_covariance(&path, COV_OFFDIAG).unwrap().unwrap();
        assert_eq!(diag.dim(), (3, 2));
        assert_relative_eq!(offdiag[[2, 0]], -0.25);
    }

    #[test]
    fn test_fits_refuses_existing_file_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("twice.fits");
        let data = sample_grid();

        write_grid(&path, &complete(&data), false).unwrap();
        assert!(write_grid(&path, &complete(&data), false).is_err());
        write_grid(&path, &complete(&data), true).unwrap();
    }

    /// Grid in the older layout: SEDs stacked over the wavelengths in the
    /// primary HDU and the parameters in the first binary table.
    fn write_legacy(path: &Path, data: &GridData) {
        let (nmodels, nbands) = data.seds.dim();
        let primary = ImageDescription {
            data_type: ImageType::Double,
            dimensions: &[nmodels + 1, nbands],
        };
        let mut f = FitsFile::create(path)
            .with_custom_primary(&primary)
            .open()
            .unwrap();
        let mut stacked: Vec<f64> = data.seds.iter().copied().collect();
        stacked.extend(data.lamb.iter());
        let hdu = f.primary_hdu().unwrap();
        hdu.write_image(&mut f, &stacked).unwrap();

        let description = ColumnDescription::new("logA")
            .with_type(ColumnDataType::Double)
            .create()
            .unwrap();
        let table = f.create_table("MODELS", &[description]).unwrap();
        let ages = data.grid.numeric_column("logA").unwrap().to_vec();
        table.write_col(&mut f, "logA", &ages).unwrap();
        table.write_key(&mut f, "TITLE", "legacy grid").unwrap();
    }

    #[test]
    fn test_legacy_layout_splits_primary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.fits");
        let data = sample_grid();
        write_legacy(&path, &data);

        assert_eq!(read_lamb(&path).unwrap(), data.lamb);
        assert_eq!(read_seds(&path).unwrap(), data.seds);

        let back = read_grid(&path).unwrap();
        assert_eq!(back.lamb, data.lamb);
        assert_eq!(back.seds, data.seds);
        assert_eq!(back.grid.keys(), vec!["logA"]);
        assert_eq!(
            back.grid.numeric_column("logA").unwrap(),
            array![6.0, 7.0, 8.0]
        );
        assert_eq!(back.header.get("NAME"), Some(&HeaderValue::from("legacy grid")));
        assert_eq!(read_column_names(&path).unwrap(), vec!["logA"]);
    }

    #[test]
    fn test_legacy_layout_without_wavelength_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty_primary.fits");
        {
            let mut f = FitsFile::create(&path).open().unwrap();
            let description = ColumnDescription::new("logA")
                .with_type(ColumnDataType::Double)
                .create()
                .unwrap();
            f.create_table("MODELS", &[description]).unwrap();
        }

        assert!(matches!(read_lamb(&path), Err(GridError::Shape(_))));
        assert!(matches!(read_seds(&path), Err(GridError::Shape(_))));
        assert!(matches!(read_grid(&path), Err(GridError::Shape(_))));
        // The table itself is still readable
        assert_eq!(read_column_names(&path).unwrap(), vec!["logA"]);
    }
}
