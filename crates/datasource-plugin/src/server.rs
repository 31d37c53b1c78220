//! WebSocket server exposing registered data sources to the host

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::handshake::HandshakeConfig;
use crate::model::HealthCheck;
use crate::plugin::DatasourcePlugin;
use crate::protocol::{
    ClientMessage, DatasourceInfo, DatasourceRequest, ProtocolError, ServerMessage,
    batch_error_response, datasource_from_wire, request_from_wire, response_to_wire,
};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),
}

type Registry = HashMap<String, Arc<dyn DatasourcePlugin>>;

/// Collects plugins before serving starts
pub struct PluginServerBuilder {
    handshake: HandshakeConfig,
    plugins: Registry,
}

impl PluginServerBuilder {
    pub fn new() -> Self {
        Self {
            handshake: HandshakeConfig::datasource(),
            plugins: HashMap::new(),
        }
    }

    pub fn handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Register a plugin under its id. Ids must be unique.
    pub fn register<P: DatasourcePlugin>(mut self, plugin: P) -> Result<Self, ServerError> {
        let id = plugin.id().to_string();
        if self.plugins.contains_key(&id) {
            return Err(ServerError::DuplicatePlugin(id));
        }
        debug!("Registered plugin {}", id);
        self.plugins.insert(id, Arc::new(plugin));
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> PluginServer {
        PluginServer {
            handshake: self.handshake,
            plugins: Arc::new(self.plugins),
        }
    }
}

impl Default for PluginServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves registered plugins until the host goes away.
///
/// The registry is immutable once built; connections share it read-only.
pub struct PluginServer {
    handshake: HandshakeConfig,
    plugins: Arc<Registry>,
}

impl PluginServer {
    pub fn builder() -> PluginServerBuilder {
        PluginServerBuilder::new()
    }

    /// Registered plugin ids, sorted
    pub fn plugin_ids(&self) -> Vec<String> {
        sorted_ids(&self.plugins)
    }

    /// Verify the handshake, bind, announce the address on stdout and serve.
    ///
    /// Blocks for the life of the process. A handshake mismatch is returned
    /// before anything is bound.
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), ServerError> {
        self.handshake.verify()?;

        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        println!("{}", self.handshake.announce(local));
        info!(
            "Serving plugins [{}] on {}",
            self.plugin_ids().join(", "),
            local
        );

        self.listen(listener).await
    }

    /// Accept WebSocket connections on an already bound listener
    pub async fn listen(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let plugins = self.plugins.clone();
            debug!("Host connected from {}", peer);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, plugins).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

fn sorted_ids(plugins: &Registry) -> Vec<String> {
    let mut ids: Vec<String> = plugins.keys().cloned().collect();
    ids.sort();
    ids
}

async fn handle_connection(stream: TcpStream, plugins: Arc<Registry>) -> Result<(), ServerError> {
    let ws = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Batches complete out of order; all replies funnel through one writer
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to encode reply: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(client_msg) => handle_message(&plugins, &tx, client_msg),
            Err(e) => {
                let _ = tx.send(ServerMessage::Error {
                    id: None,
                    message: format!("Invalid message: {}", e),
                });
            }
        }
    }

    debug!("Host disconnected");
    forward_task.abort();
    Ok(())
}

fn handle_message(
    plugins: &Arc<Registry>,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::ListPlugins => {
            let _ = tx.send(ServerMessage::Plugins {
                ids: sorted_ids(plugins),
            });
        }

        ClientMessage::Query {
            id,
            plugin,
            request,
        } => {
            let Some(plugin) = plugins.get(&plugin).cloned() else {
                let _ = tx.send(unknown_plugin(id, &plugin));
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = run_batch(id, plugin, request).await;
                let _ = tx.send(reply);
            });
        }

        ClientMessage::CheckHealth {
            id,
            plugin,
            datasource,
        } => {
            let Some(plugin) = plugins.get(&plugin).cloned() else {
                let _ = tx.send(unknown_plugin(id, &plugin));
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = run_health_check(id, plugin, datasource).await;
                let _ = tx.send(reply);
            });
        }
    }
}

fn unknown_plugin(id: u64, plugin: &str) -> ServerMessage {
    ServerMessage::Error {
        id: Some(id),
        message: format!("Unknown plugin: {}", plugin),
    }
}

async fn run_batch(
    id: u64,
    plugin: Arc<dyn DatasourcePlugin>,
    request: DatasourceRequest,
) -> ServerMessage {
    let start = Instant::now();
    let plugin_id = plugin.id().to_string();

    let batch = match request_from_wire(&request) {
        Ok(batch) => batch,
        Err(e) => {
            warn!("Rejected request {} for {}: {}", id, plugin_id, e);
            return ServerMessage::Error {
                id: Some(id),
                message: e.to_string(),
            };
        }
    };
    debug!(
        "Batch {} for {}: {} queries, range {} .. {}",
        id,
        plugin_id,
        batch.queries.len(),
        batch.range.from,
        batch.range.to
    );

    let outcome = tokio::task::spawn_blocking(move || {
        plugin.query(&batch.range, &batch.datasource, &batch.queries)
    })
    .await;

    let response = match outcome {
        Ok(Ok(results)) => {
            info!(
                "Batch {} for {} succeeded in {:.2?}",
                id,
                plugin_id,
                start.elapsed()
            );
            response_to_wire(results)
        }
        Ok(Err(e)) => {
            warn!(
                "Batch {} for {} failed in {:.2?}: {}",
                id,
                plugin_id,
                start.elapsed(),
                e
            );
            batch_error_response(&request, &e.to_string())
        }
        Err(e) => {
            error!("Batch {} for {} task failed: {}", id, plugin_id, e);
            batch_error_response(&request, &format!("query task failed: {}", e))
        }
    };

    ServerMessage::QueryResponse { id, response }
}

async fn run_health_check(
    id: u64,
    plugin: Arc<dyn DatasourcePlugin>,
    datasource: DatasourceInfo,
) -> ServerMessage {
    let config = datasource_from_wire(&datasource);
    let check = tokio::task::spawn_blocking(move || plugin.check_health(&config))
        .await
        .unwrap_or_else(|e| HealthCheck::error(format!("health check task failed: {}", e)));

    ServerMessage::Health {
        id,
        status: check.status,
        message: check.message,
    }
}
