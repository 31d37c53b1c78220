//! Request-scoped query model shared by every data source
//!
//! These are the types an executor sees after the wire request has been
//! translated. They carry no behavior beyond construction and decoding of
//! opaque payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

/// Time bounds of a query batch. Advisory: executors are not required to filter by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// A JSON document whose schema belongs to one data source type.
///
/// The raw text is kept verbatim and only decoded by the executor that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpaqueJson(String);

impl OpaqueJson {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Decode into a data-source specific settings or query type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    /// Encode a value as an opaque payload
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for OpaqueJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data source instance as configured in the host
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceConfig {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub type_name: String,
    pub url: String,
    /// Data-source specific settings (e.g. a file path)
    pub json_data: OpaqueJson,
}

/// A single query within a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Correlates the result with this query
    pub ref_id: String,
    pub max_data_points: i64,
    pub interval: Duration,
    pub model: OpaqueJson,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Point {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A named, optionally tagged series of points
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub points: Vec<Point>,
}

impl DataFrame {
    pub fn new(name: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            points,
        }
    }
}

/// Outcome of one query. Exactly one is produced per input query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub ref_id: String,
    pub error: Option<String>,
    pub meta: Option<OpaqueJson>,
    pub frames: Vec<DataFrame>,
}

impl QueryResult {
    /// Successful result carrying frames
    pub fn frames(ref_id: impl Into<String>, frames: Vec<DataFrame>) -> Self {
        Self {
            ref_id: ref_id.into(),
            frames,
            ..Default::default()
        }
    }

    /// Result reporting a query-level error
    pub fn failed(ref_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, meta: OpaqueJson) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Error,
}

/// Result of testing a data source configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthCheck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Settings {
        path: String,
    }

    #[test]
    fn opaque_json_decodes_on_demand() {
        let raw = OpaqueJson::new(r#"{"path": "/tmp/data.csv"}"#);
        let settings: Settings = raw.decode().unwrap();
        assert_eq!(settings.path, "/tmp/data.csv");
        assert_eq!(raw.as_str(), r#"{"path": "/tmp/data.csv"}"#);
    }

    #[test]
    fn opaque_json_rejects_empty_document() {
        let raw = OpaqueJson::default();
        assert!(raw.decode::<Settings>().is_err());
    }

    #[test]
    fn failed_result_has_no_frames() {
        let result = QueryResult::failed("A", "boom");
        assert_eq!(result.ref_id, "A");
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.frames.is_empty());
    }
}
