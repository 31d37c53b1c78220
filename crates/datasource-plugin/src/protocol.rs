//! Wire protocol message types and the translation to and from the query model
//!
//! The adapter functions here are pure: they hold no state and never touch the
//! transport, so they can be tested without standing up a server.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    DataFrame, DataSourceConfig, HealthStatus, OpaqueJson, Query, QueryResult, TimeRange,
};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Handshake failed: environment variable {key} does not carry the expected cookie")]
    CookieMismatch { key: String },
    #[error("Handshake failed: host offers protocol versions [{offered}], plugin speaks {supported}")]
    UnsupportedVersion { offered: String, supported: u32 },
    #[error("Timestamp out of range: {0} ms")]
    TimestampOutOfRange(i64),
    #[error("Invalid message JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

// ============ Wire Request ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTimeRange {
    pub from_epoch_ms: i64,
    pub to_epoch_ms: i64,
}

/// Data source descriptor as sent by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasourceInfo {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub url: String,
    pub json_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireQuery {
    pub ref_id: String,
    pub max_data_points: i64,
    pub interval_ms: i64,
    pub model_json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceRequest {
    pub time_range: WireTimeRange,
    pub datasource: DatasourceInfo,
    #[serde(default)]
    pub queries: Vec<WireQuery>,
}

// ============ Wire Response ============

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub points: Vec<WirePoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQueryResult {
    pub ref_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_json: Option<String>,
    #[serde(default)]
    pub series: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasourceResponse {
    pub results: Vec<WireQueryResult>,
}

// ============ Session Envelope ============

/// Messages from host to plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// List registered plugin ids
    ListPlugins,
    /// Execute a query batch against a plugin
    Query {
        id: u64,
        plugin: String,
        request: DatasourceRequest,
    },
    /// Test a data source configuration
    CheckHealth {
        id: u64,
        plugin: String,
        datasource: DatasourceInfo,
    },
}

/// Messages from plugin to host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Plugins {
        ids: Vec<String>,
    },
    QueryResponse {
        id: u64,
        response: DatasourceResponse,
    },
    Health {
        id: u64,
        status: HealthStatus,
        message: String,
    },
    /// Request-level failure; `id` is absent when the message could not be decoded
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        message: String,
    },
}

// ============ Adapter ============

/// A wire request translated into the query model
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    pub range: TimeRange,
    pub datasource: DataSourceConfig,
    pub queries: Vec<Query>,
}

fn datetime_from_millis(ms: i64) -> Result<DateTime<Utc>, ProtocolError> {
    DateTime::from_timestamp_millis(ms).ok_or(ProtocolError::TimestampOutOfRange(ms))
}

pub fn datasource_from_wire(info: &DatasourceInfo) -> DataSourceConfig {
    DataSourceConfig {
        id: info.id,
        org_id: info.org_id,
        name: info.name.clone(),
        type_name: info.type_name.clone(),
        url: info.url.clone(),
        json_data: OpaqueJson::new(info.json_data.clone()),
    }
}

fn query_from_wire(query: &WireQuery) -> Query {
    Query {
        ref_id: query.ref_id.clone(),
        max_data_points: query.max_data_points,
        // negative intervals carry no meaning, treat as unset
        interval: Duration::from_millis(u64::try_from(query.interval_ms).unwrap_or(0)),
        model: OpaqueJson::new(query.model_json.clone()),
    }
}

/// Translate a host request into the query model
pub fn request_from_wire(request: &DatasourceRequest) -> Result<QueryBatch, ProtocolError> {
    let range = TimeRange {
        from: datetime_from_millis(request.time_range.from_epoch_ms)?,
        to: datetime_from_millis(request.time_range.to_epoch_ms)?,
    };

    Ok(QueryBatch {
        range,
        datasource: datasource_from_wire(&request.datasource),
        queries: request.queries.iter().map(query_from_wire).collect(),
    })
}

fn frame_to_wire(frame: DataFrame) -> TimeSeries {
    TimeSeries {
        name: frame.name,
        tags: frame.tags,
        points: frame
            .points
            .into_iter()
            .map(|p| WirePoint {
                timestamp: p.timestamp.timestamp_millis(),
                value: p.value,
            })
            .collect(),
    }
}

/// Translate executor results into the host response
pub fn response_to_wire(results: Vec<QueryResult>) -> DatasourceResponse {
    DatasourceResponse {
        results: results
            .into_iter()
            .map(|r| WireQueryResult {
                ref_id: r.ref_id,
                error: r.error,
                meta_json: r.meta.map(OpaqueJson::into_string),
                series: r.frames.into_iter().map(frame_to_wire).collect(),
            })
            .collect(),
    }
}

/// Response for a batch the executor failed as a whole.
///
/// Every query in the request gets a result carrying the message, so the host
/// can render the failure per query instead of seeing a transport fault.
pub fn batch_error_response(request: &DatasourceRequest, message: &str) -> DatasourceResponse {
    DatasourceResponse {
        results: request
            .queries
            .iter()
            .map(|q| WireQueryResult {
                ref_id: q.ref_id.clone(),
                error: Some(message.to_string()),
                ..Default::default()
            })
            .collect(),
    }
}
