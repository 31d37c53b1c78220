//! CSV data source - answers time-series queries from a delimited file
//!
//! A query names fields of the file's header row. The selected columns are
//! transposed back into rows, the first two entries of each row are parsed as
//! (timestamp, value), and the points come back as one frame per query.
//!
//! # Pipeline
//!
//! - [`table`] loads the file into named columns
//! - [`select`] transposes the requested columns into row tuples
//! - [`series`] parses row tuples into points, strictly or leniently
//! - [`executor`] decodes payloads and runs the above once per query
//! - [`cache`] optionally keeps loaded tables between queries

pub mod cache;
pub mod error;
pub mod executor;
pub mod select;
pub mod series;
pub mod table;

pub use cache::TableCache;
pub use error::CsvError;
pub use executor::{BatchPolicy, CsvDatasource, CsvOptions, CsvQuery, CsvSettings, PLUGIN_ID};
pub use series::{ParseMode, Series};
pub use table::Table;
