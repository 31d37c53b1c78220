//! CSV query executor
//!
//! Each query names an ordered list of fields. The first two are read as
//! (timestamp, value) and become one frame named after the value field.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use datasource_plugin::{
    BoxError, DataFrame, DataSourceConfig, DatasourcePlugin, HealthCheck, OpaqueJson, Query,
    QueryResult, TimeRange,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cache::TableCache;
use crate::error::CsvError;
use crate::select::{MIN_FIELDS, select_rows, validate_fields};
use crate::series::{ParseMode, build_series};
use crate::table::Table;

/// Identifier the host uses for this data source
pub const PLUGIN_ID: &str = "csv-datasource";

/// Data-source settings carried in the host's `jsonData`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvOptions {
    pub path: PathBuf,
    /// Overrides the executor's default parse mode
    #[serde(default)]
    pub parse_mode: Option<ParseMode>,
}

/// Per-query payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvQuery {
    #[serde(default)]
    pub ref_id: String,
    /// Comma-separated field names
    pub fields: String,
}

/// Just the ref id, readable from payloads that fail full decoding
#[derive(Deserialize)]
struct PayloadRefId {
    #[serde(default, rename = "refId")]
    ref_id: String,
}

/// The wire ref id, or the payload's when the wire value is empty
fn resolve_ref_id(query: &Query) -> String {
    if !query.ref_id.is_empty() {
        return query.ref_id.clone();
    }
    query
        .model
        .decode::<PayloadRefId>()
        .map(|p| p.ref_id)
        .unwrap_or_default()
}

impl CsvQuery {
    /// Field names in request order, trimmed, empty entries dropped
    pub fn field_names(&self) -> Vec<String> {
        self.fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect()
    }
}

/// How a failing query affects the rest of its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// The first failing query fails the whole batch
    #[default]
    AbortBatch,
    /// A failing query gets an error result; the others still run
    IsolateQueries,
}

#[derive(Debug, Clone, Default)]
pub struct CsvSettings {
    pub parse_mode: ParseMode,
    pub batch_policy: BatchPolicy,
    /// Cache loaded tables across queries and batches (None = load every time)
    pub cache_capacity: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameMeta {
    skipped_rows: usize,
}

pub struct CsvDatasource {
    settings: CsvSettings,
    cache: Option<TableCache>,
}

impl CsvDatasource {
    pub fn new(settings: CsvSettings) -> Self {
        let cache = settings.cache_capacity.map(TableCache::new);
        Self { settings, cache }
    }

    pub fn settings(&self) -> &CsvSettings {
        &self.settings
    }

    /// Run a batch, returning one result per query in request order
    pub fn run_batch(
        &self,
        datasource: &DataSourceConfig,
        queries: &[Query],
    ) -> Result<Vec<QueryResult>, CsvError> {
        let options: CsvOptions = datasource.json_data.decode().map_err(CsvError::Config)?;
        let mode = options.parse_mode.unwrap_or(self.settings.parse_mode);
        debug!(
            "CSV batch on {}: {} queries, {:?} mode",
            options.path.display(),
            queries.len(),
            mode
        );

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let ref_id = resolve_ref_id(query);
            match self.run_query(&options.path, mode, &ref_id, query) {
                Ok(result) => results.push(result),
                Err(e) if self.settings.batch_policy == BatchPolicy::IsolateQueries => {
                    warn!("Query {} failed: {}", ref_id, e);
                    results.push(QueryResult::failed(ref_id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    fn run_query(
        &self,
        path: &Path,
        mode: ParseMode,
        ref_id: &str,
        query: &Query,
    ) -> Result<QueryResult, CsvError> {
        let model: CsvQuery = query.model.decode().map_err(|source| CsvError::Query {
            ref_id: ref_id.to_string(),
            source,
        })?;

        let fields = model.field_names();
        validate_fields(&fields)?;

        let table = self.load_table(path)?;
        let rows = select_rows(&table, &fields)?;
        let series = build_series(&rows, mode)?;

        let frame = DataFrame::new(fields[1].clone(), series.points);
        let mut result = QueryResult::frames(ref_id.to_string(), vec![frame]);
        if series.skipped > 0 {
            let meta = FrameMeta {
                skipped_rows: series.skipped,
            };
            match OpaqueJson::encode(&meta) {
                Ok(meta) => result = result.with_meta(meta),
                Err(e) => warn!("Failed to encode frame metadata: {}", e),
            }
        }
        Ok(result)
    }

    fn load_table(&self, path: &Path) -> Result<Arc<Table>, CsvError> {
        match &self.cache {
            Some(cache) => cache.get_or_load(path),
            None => Table::load(path).map(Arc::new),
        }
    }
}

impl Default for CsvDatasource {
    fn default() -> Self {
        Self::new(CsvSettings::default())
    }
}

impl DatasourcePlugin for CsvDatasource {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn query(
        &self,
        range: &TimeRange,
        datasource: &DataSourceConfig,
        queries: &[Query],
    ) -> Result<Vec<QueryResult>, BoxError> {
        // the range is advisory; rows outside it are still returned
        debug!("Query range {} .. {}", range.from, range.to);
        Ok(self.run_batch(datasource, queries)?)
    }

    fn check_health(&self, datasource: &DataSourceConfig) -> HealthCheck {
        let options: CsvOptions = match datasource.json_data.decode() {
            Ok(options) => options,
            Err(e) => return HealthCheck::error(CsvError::Config(e).to_string()),
        };

        match self.load_table(&options.path) {
            Ok(table) if table.width() < MIN_FIELDS => HealthCheck::error(format!(
                "{} has {} columns, at least {} are needed",
                options.path.display(),
                table.width(),
                MIN_FIELDS
            )),
            Ok(table) => HealthCheck::ok(format!(
                "Data source is working: {} columns, {} rows",
                table.width(),
                table.height()
            )),
            Err(e) => HealthCheck::error(e.to_string()),
        }
    }
}
