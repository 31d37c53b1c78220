//! Loading a delimited file into named columns

use std::io::Cursor;
use std::path::Path;

use indexmap::IndexMap;
use polars::prelude::{CsvReadOptions, DataFrame as PolarsFrame, PolarsResult, SerReader};

use crate::error::CsvError;

/// Column-oriented table keyed by header name, columns in header order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: IndexMap<String, Vec<String>>,
}

impl Table {
    /// Load a file, using the first record as the header row.
    ///
    /// A file with no records (empty, or only blank lines) yields an empty
    /// table. Every cell is kept as text; empty cells become empty strings.
    pub fn load(path: &Path) -> Result<Self, CsvError> {
        let bytes = std::fs::read(path).map_err(|e| CsvError::resource(path, e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        // schema inference disabled so every column decodes as a string
        let table = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .and_then(|df| Self::from_frame(&df))
            .map_err(|source| CsvError::Format {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!(
            "Loaded {}: {} columns, {} rows",
            path.display(),
            table.width(),
            table.height()
        );
        Ok(table)
    }

    fn from_frame(df: &PolarsFrame) -> PolarsResult<Self> {
        let mut columns = IndexMap::with_capacity(df.width());
        for column in df.get_columns() {
            let values = column
                .as_materialized_series()
                .str()?
                .into_iter()
                .map(|cell| cell.unwrap_or_default().to_string())
                .collect();
            columns.insert(column.name().to_string(), values);
        }
        Ok(Self { columns })
    }

    /// Build a table from named columns
    pub fn from_columns<N, V>(columns: impl IntoIterator<Item = (N, Vec<V>)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of data rows, measured on the first column
    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, |(_, values)| values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
