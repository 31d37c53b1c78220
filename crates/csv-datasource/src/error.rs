//! Errors raised while answering a CSV query

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsvError {
    /// The backing file could not be opened or read
    #[error("cannot read {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The decoder rejected the table structure
    #[error("malformed table {}: {source}", path.display())]
    Format { path: PathBuf, source: PolarsError },
    #[error("requires at least 2 fields, got {0}")]
    Validation(usize),
    /// Malformed timestamp or number in strict mode; `row` counts data rows from 1
    #[error("row {row}: {message}")]
    Parse { row: usize, message: String },
    #[error("invalid data source settings: {0}")]
    Config(#[source] serde_json::Error),
    #[error("invalid query {ref_id}: {source}")]
    Query {
        ref_id: String,
        source: serde_json::Error,
    },
}

impl CsvError {
    pub(crate) fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }
}
