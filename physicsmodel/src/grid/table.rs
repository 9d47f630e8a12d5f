//! Parameter table, header and alias types shared by every grid backend.
//!
//! The parameter table is column oriented: each named column holds one value
//! per model, in the same row order as the SED matrix. Row order is never
//! changed in place; [`ParamTable::select_rows`] builds a new table.

use std::collections::BTreeMap;
use std::fmt;
use std::mem::size_of;

use ndarray::Array1;

use super::GridError;

/// Canonical header key holding the whitespace separated filter names.
pub const FILTERS_KEY: &str = "filters";

/// Alternate column name -> canonical column name.
pub type Aliases = BTreeMap<String, String>;

/// One typed column of the parameter table
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Double precision values (ages, masses, dust, weights)
    Float(Array1<f64>),
    /// Integer values (model indices, flags)
    Int(Array1<i64>),
    /// Text values (source names, stage labels)
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(a) => a.len(),
            Column::Int(a) => a.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type label used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Float(_) => "float",
            Column::Int(_) => "int",
            Column::Str(_) => "str",
        }
    }

    /// Numeric view of the column as f64, `None` for text columns.
    pub fn to_f64(&self) -> Option<Array1<f64>> {
        match self {
            Column::Float(a) => Some(a.clone()),
            Column::Int(a) => Some(a.mapv(|v| v as f64)),
            Column::Str(_) => None,
        }
    }

    /// New column holding the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Float(a) => Column::Float(rows.iter().map(|&i| a[i]).collect()),
            Column::Int(a) => Column::Int(rows.iter().map(|&i| a[i]).collect()),
            Column::Str(v) => Column::Str(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Concatenate another column of the same type below this one.
    pub fn extend(&mut self, name: &str, other: &Column) -> Result<(), GridError> {
        match (self, other) {
            (Column::Float(a), Column::Float(b)) => {
                *a = a.iter().chain(b.iter()).copied().collect();
            }
            (Column::Int(a), Column::Int(b)) => {
                *a = a.iter().chain(b.iter()).copied().collect();
            }
            (Column::Str(a), Column::Str(b)) => a.extend(b.iter().cloned()),
            (this, other) => {
                return Err(GridError::ColumnType {
                    column: name.to_string(),
                    expected: this.type_name(),
                    found: other.type_name(),
                })
            }
        }
        Ok(())
    }

    pub fn nbytes(&self) -> usize {
        match self {
            Column::Float(a) => a.len() * size_of::<f64>(),
            Column::Int(a) => a.len() * size_of::<i64>(),
            Column::Str(v) => v.iter().map(|s| s.len() + size_of::<String>()).sum(),
        }
    }
}

/// Table of physical parameters, one row per model in the grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    names: Vec<String>,
    columns: Vec<Column>,
    nrows: usize,
}

impl ParamTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ParamTable::add_column`]
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, GridError> {
        self.add_column(name, column)?;
        Ok(self)
    }

    /// Append a new column.
    ///
    /// The first column fixes the row count; later columns must match it.
    pub fn add_column(&mut self, name: &str, column: Column) -> Result<(), GridError> {
        if self.names.iter().any(|n| n == name) {
            return Err(GridError::DuplicateColumn(name.to_string()));
        }
        self.check_length(name, &column)?;
        if self.columns.is_empty() {
            self.nrows = column.len();
        }
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(())
    }

    /// Replace a column, or append it when absent.
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<(), GridError> {
        match self.names.iter().position(|n| n == name) {
            Some(idx) => {
                if self.columns.len() > 1 {
                    self.check_length(name, &column)?;
                }
                self.nrows = column.len();
                self.columns[idx] = column;
                Ok(())
            }
            None => self.add_column(name, column),
        }
    }

    fn check_length(&self, name: &str, column: &Column) -> Result<(), GridError> {
        if !self.columns.is_empty() && column.len() != self.nrows {
            return Err(GridError::LengthMismatch {
                what: format!("column '{name}'"),
                expected: self.nrows,
                found: column.len(),
            });
        }
        Ok(())
    }

    /// Remove a column, returning it when it existed.
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.names.remove(idx);
        let column = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.nrows = 0;
        }
        Some(column)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&mut self.columns[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Column values as f64; text columns are a type error.
    pub fn numeric_column(&self, name: &str) -> Result<Array1<f64>, GridError> {
        let column = self
            .column(name)
            .ok_or_else(|| GridError::ColumnNotFound(name.to_string()))?;
        column.to_f64().ok_or_else(|| GridError::ColumnType {
            column: name.to_string(),
            expected: "numeric",
            found: column.type_name(),
        })
    }

    /// Column names in table order
    pub fn keys(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate `(name, column)` pairs in table order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    /// Number of rows (models)
    pub fn len(&self) -> usize {
        self.nrows
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// New table holding the given rows of every column, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<ParamTable, GridError> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.nrows) {
            return Err(GridError::RowOutOfRange {
                row: bad,
                nrows: self.nrows,
            });
        }
        Ok(ParamTable {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            nrows: rows.len(),
        })
    }

    /// Append the rows of another table with the same columns.
    pub fn append_rows(&mut self, other: &ParamTable) -> Result<(), GridError> {
        if self.names != other.names {
            return Err(GridError::SchemaMismatch {
                expected: self.names.join(","),
                found: other.names.join(","),
            });
        }
        for (name, (column, extra)) in self
            .names
            .iter()
            .zip(self.columns.iter_mut().zip(other.columns.iter()))
        {
            column.extend(name, extra)?;
        }
        self.nrows += other.nrows;
        Ok(())
    }

    pub fn nbytes(&self) -> usize {
        self.columns.iter().map(Column::nbytes).sum::<usize>()
            + self.names.iter().map(String::len).sum::<usize>()
    }
}

/// A single header value
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => write!(f, "{s}"),
            HeaderValue::Int(v) => write!(f, "{v}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// Free-form grid metadata.
///
/// The filter list always lives under the lowercase [`FILTERS_KEY`]; any
/// other casing found on disk is renamed on ingest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: BTreeMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from raw on-disk entries.
    ///
    /// `ALIAS*` entries of the form `"old=new"` are moved into the returned
    /// alias map and the filter key is normalized.
    pub fn from_entries<I>(entries: I) -> (Header, Aliases)
    where
        I: IntoIterator<Item = (String, HeaderValue)>,
    {
        let mut header = Header::new();
        let mut aliases = Aliases::new();
        for (key, value) in entries {
            if key.starts_with("ALIAS") {
                match value.as_str().and_then(|s| s.split_once('=')) {
                    Some((alt, canonical)) => {
                        aliases.insert(alt.trim().to_string(), canonical.trim().to_string());
                    }
                    None => log::warn!("Ignoring malformed alias entry {key}={value}"),
                }
                continue;
            }
            header.insert(key, value);
        }
        (header, aliases)
    }

    /// Insert an entry, normalizing the filter key casing.
    pub fn insert<K: Into<String>, V: Into<HeaderValue>>(&mut self, key: K, value: V) {
        let mut key = key.into();
        if key.eq_ignore_ascii_case(FILTERS_KEY) {
            key = FILTERS_KEY.to_string();
        }
        self.entries.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every entry of `other` into this header, overwriting duplicates.
    pub fn merge(&mut self, other: &Header) {
        for (k, v) in other.iter() {
            self.insert(k.clone(), v.clone());
        }
    }

    /// Filter names parsed from the filter entry, if any.
    pub fn filters(&self) -> Option<Vec<String>> {
        let value = self.entries.get(FILTERS_KEY)?.as_str()?;
        Some(value.split_whitespace().map(str::to_string).collect())
    }

    /// Store the filter list as a single space separated string.
    pub fn set_filters<S: AsRef<str>>(&mut self, filters: &[S]) {
        let joined = filters
            .iter()
            .map(|f| f.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        self.entries
            .insert(FILTERS_KEY.to_string(), HeaderValue::Str(joined));
    }

    /// Fill an empty or placeholder `NAME` from `TITLE`.
    pub fn backfill_name(&mut self) {
        const PLACEHOLDERS: [&str; 3] = ["", "None", "Noname"];
        let is_placeholder = |v: Option<&HeaderValue>| match v {
            None => true,
            Some(HeaderValue::Str(s)) => PLACEHOLDERS.contains(&s.as_str()),
            Some(_) => false,
        };

        if is_placeholder(self.entries.get("NAME")) && !is_placeholder(self.entries.get("TITLE"))
        {
            if let Some(title) = self.entries.get("TITLE").cloned() {
                self.entries.insert("NAME".to_string(), title);
            }
        }
    }

    pub fn nbytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(k, v)| {
                k.len()
                    + match v {
                        HeaderValue::Str(s) => s.len(),
                        _ => size_of::<HeaderValue>(),
                    }
            })
            .sum()
    }
}
