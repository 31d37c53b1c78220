//! The executor seam between the server and a concrete data source

use crate::model::{DataSourceConfig, HealthCheck, Query, QueryResult, TimeRange};

/// Error type crossing the plugin boundary
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A data source the plugin server can dispatch batches to.
///
/// Implementations are called from tokio's blocking pool and may be invoked
/// concurrently for independent batches.
pub trait DatasourcePlugin: Send + Sync + 'static {
    /// Unique identifier the host uses to address this data source
    fn id(&self) -> &str;

    /// Execute a batch of queries.
    ///
    /// Returns one result per query, in request order. `Err` fails the
    /// whole batch.
    fn query(
        &self,
        range: &TimeRange,
        datasource: &DataSourceConfig,
        queries: &[Query],
    ) -> Result<Vec<QueryResult>, BoxError>;

    /// Test that a data source configuration is usable
    fn check_health(&self, datasource: &DataSourceConfig) -> HealthCheck {
        let _ = datasource;
        HealthCheck::ok("Data source is working")
    }
}
