//! Data source plugin SDK - the host-facing half of a backend data source
//!
//! This crate provides:
//! - The request-scoped query model (`TimeRange`, `Query`, `DataFrame`, ...)
//! - The `DatasourcePlugin` trait implemented by concrete data sources
//! - Translation between the host's wire messages and the query model
//! - The startup handshake and the WebSocket server that dispatches batches
//!
//! # Example
//!
//! ```ignore
//! use datasource_plugin::PluginServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = PluginServer::builder().register(MyDatasource::new())?.build();
//!     server.serve("127.0.0.1:0".parse()?).await?;
//!     Ok(())
//! }
//! ```

pub mod handshake;
pub mod model;
pub mod plugin;
pub mod protocol;
pub mod server;

pub use handshake::HandshakeConfig;
pub use model::{
    DataFrame, DataSourceConfig, HealthCheck, HealthStatus, OpaqueJson, Point, Query,
    QueryResult, TimeRange,
};
pub use plugin::{BoxError, DatasourcePlugin};
pub use protocol::{
    ClientMessage, DatasourceInfo, DatasourceRequest, DatasourceResponse, ProtocolError,
    ServerMessage, WireQuery, WireTimeRange,
};
pub use server::{PluginServer, PluginServerBuilder, ServerError};
