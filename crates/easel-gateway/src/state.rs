//! Gateway shared state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use easel_canvas::{CanvasManager, CanvasStore, ServerFrame, TopicBus};
use easel_core::config::Config;
use easel_core::protocol::StatusFrame;
use easel_tools::ToolRegistry;

use crate::interactions::InteractionRouter;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub canvas: Arc<CanvasManager>,
    pub status: TopicBus<StatusFrame>,
    pub interactions: InteractionRouter,
    pub tools: Arc<ToolRegistry>,
    pub connections: RwLock<HashMap<String, ConnectionState>>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

/// Which endpoint a connection came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Canvas,
    Status,
    Agent,
}

/// Per-connection bookkeeping.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub conn_id: String,
    pub kind: ConnectionKind,
    pub connected_at: DateTime<Utc>,
}

impl GatewayState {
    /// Build the store, both buses and the tool registry from config.
    pub fn new(config: Arc<Config>) -> Self {
        let capacity = config.channel_capacity();
        let store = Arc::new(CanvasStore::new().with_max_snapshots(config.max_snapshots()));
        let canvas = Arc::new(CanvasManager::new(
            store,
            TopicBus::<ServerFrame>::new("canvas", capacity),
        ));

        let mut tools = ToolRegistry::new();
        easel_tools::register_builtin_tools(&mut tools, canvas.clone());

        Self {
            config,
            canvas,
            status: TopicBus::new("status", capacity),
            interactions: InteractionRouter::new(),
            tools: Arc::new(tools),
            connections: RwLock::new(HashMap::new()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub async fn register_connection(&self, conn_id: &str, kind: ConnectionKind) {
        self.connections.write().await.insert(
            conn_id.to_string(),
            ConnectionState {
                conn_id: conn_id.to_string(),
                kind,
                connected_at: Utc::now(),
            },
        );
        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_connect(kind);
    }

    pub async fn cleanup_connection(&self, conn_id: &str) {
        let removed = self.connections.write().await.remove(conn_id);
        if let Some(conn) = removed {
            debug!(conn_id, kind = ?conn.kind, "Connection removed");
            #[cfg(feature = "metrics")]
            crate::metrics::record_ws_disconnect(conn.kind);
        }
    }

    pub async fn connection_count(&self, kind: ConnectionKind) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.kind == kind)
            .count()
    }
}
