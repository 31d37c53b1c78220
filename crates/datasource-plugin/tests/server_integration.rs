//! Integration tests for the plugin WebSocket server
//!
//! These drive the server the way the host does:
//! - Host connects, lists plugins, sends query batches
//! - Batch failures come back as per-query errors
//! - Unknown plugins and garbage input get an error reply

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use datasource_plugin::{
    BoxError, ClientMessage, DataFrame, DataSourceConfig, DatasourceInfo, DatasourcePlugin,
    DatasourceRequest, HealthStatus, Point, PluginServer, Query, QueryResult, ServerMessage,
    TimeRange, WireQuery, WireTimeRange,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Emits one point per query at the start of the range, valued from the model
struct ConstantPlugin;

#[derive(Deserialize)]
struct ConstantModel {
    value: f64,
}

impl DatasourcePlugin for ConstantPlugin {
    fn id(&self) -> &str {
        "constant"
    }

    fn query(
        &self,
        range: &TimeRange,
        _datasource: &DataSourceConfig,
        queries: &[Query],
    ) -> Result<Vec<QueryResult>, BoxError> {
        queries
            .iter()
            .map(|q| -> Result<QueryResult, BoxError> {
                let model: ConstantModel = q.model.decode()?;
                Ok(QueryResult::frames(
                    q.ref_id.clone(),
                    vec![DataFrame::new(
                        "constant",
                        vec![Point::new(range.from, model.value)],
                    )],
                ))
            })
            .collect()
    }
}

/// Fails every batch
struct BrokenPlugin;

impl DatasourcePlugin for BrokenPlugin {
    fn id(&self) -> &str {
        "broken"
    }

    fn query(
        &self,
        _range: &TimeRange,
        _datasource: &DataSourceConfig,
        _queries: &[Query],
    ) -> Result<Vec<QueryResult>, BoxError> {
        Err("backing store unavailable".into())
    }
}

async fn setup_test_server() -> SocketAddr {
    let server = PluginServer::builder()
        .register(ConstantPlugin)
        .unwrap()
        .register(BrokenPlugin)
        .unwrap()
        .build();
    let server = Arc::new(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        server.listen(listener).await.unwrap();
    });

    addr
}

async fn connect_client(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{}", addr);
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

async fn send(ws: &mut WsStream, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn recv(ws: &mut WsStream) -> ServerMessage {
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timeout waiting for message")
        .expect("Stream closed")
        .expect("WebSocket error");

    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("Invalid JSON"),
        other => panic!("Expected text message, got {:?}", other),
    }
}

fn request(models: &[(&str, &str)]) -> DatasourceRequest {
    DatasourceRequest {
        time_range: WireTimeRange {
            from_epoch_ms: 1_000,
            to_epoch_ms: 2_000,
        },
        datasource: DatasourceInfo::default(),
        queries: models
            .iter()
            .map(|(ref_id, model)| WireQuery {
                ref_id: ref_id.to_string(),
                model_json: model.to_string(),
                ..Default::default()
            })
            .collect(),
    }
}

// ============ Tests ============

#[tokio::test]
async fn test_list_plugins() {
    let addr = setup_test_server().await;
    let mut ws = connect_client(addr).await;

    send(&mut ws, &ClientMessage::ListPlugins).await;

    match recv(&mut ws).await {
        ServerMessage::Plugins { ids } => assert_eq!(ids, vec!["broken", "constant"]),
        other => panic!("Expected Plugins, got {:?}", other),
    }
}

#[tokio::test]
async fn test_query_results_correlate_by_ref_id() {
    let addr = setup_test_server().await;
    let mut ws = connect_client(addr).await;

    send(
        &mut ws,
        &ClientMessage::Query {
            id: 1,
            plugin: "constant".into(),
            request: request(&[("A", r#"{"value": 1.5}"#), ("B", r#"{"value": 2.5}"#)]),
        },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::QueryResponse { id, response } => {
            assert_eq!(id, 1);
            assert_eq!(response.results.len(), 2);
            assert_eq!(response.results[0].ref_id, "A");
            assert_eq!(response.results[0].series[0].points[0].timestamp, 1_000);
            assert_eq!(response.results[0].series[0].points[0].value, 1.5);
            assert_eq!(response.results[1].ref_id, "B");
            assert_eq!(response.results[1].series[0].points[0].value, 2.5);
        }
        other => panic!("Expected QueryResponse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_failure_is_reported_per_query() {
    let addr = setup_test_server().await;
    let mut ws = connect_client(addr).await;

    send(
        &mut ws,
        &ClientMessage::Query {
            id: 9,
            plugin: "broken".into(),
            request: request(&[("A", "{}"), ("B", "{}")]),
        },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::QueryResponse { id, response } => {
            assert_eq!(id, 9);
            assert_eq!(response.results.len(), 2);
            for result in &response.results {
                assert_eq!(result.error.as_deref(), Some("backing store unavailable"));
                assert!(result.series.is_empty());
            }
        }
        other => panic!("Expected QueryResponse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_plugin() {
    let addr = setup_test_server().await;
    let mut ws = connect_client(addr).await;

    send(
        &mut ws,
        &ClientMessage::Query {
            id: 3,
            plugin: "missing".into(),
            request: request(&[]),
        },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Error { id, message } => {
            assert_eq!(id, Some(3));
            assert!(message.contains("missing"));
        }
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_message() {
    let addr = setup_test_server().await;
    let mut ws = connect_client(addr).await;

    ws.send(Message::Text("not json".into())).await.unwrap();

    match recv(&mut ws).await {
        ServerMessage::Error { id, message } => {
            assert_eq!(id, None);
            assert!(message.starts_with("Invalid message"));
        }
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_health_check() {
    let addr = setup_test_server().await;
    let mut ws = connect_client(addr).await;

    send(
        &mut ws,
        &ClientMessage::CheckHealth {
            id: 4,
            plugin: "constant".into(),
            datasource: DatasourceInfo::default(),
        },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Health { id, status, .. } => {
            assert_eq!(id, 4);
            assert_eq!(status, HealthStatus::Ok);
        }
        other => panic!("Expected Health, got {:?}", other),
    }
}
