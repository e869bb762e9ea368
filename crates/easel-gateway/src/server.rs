//! Axum HTTP and WebSocket server.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::canvas::{canvas_ws_handler, canvas_ws_handler_for};
use crate::events::status_ws_handler;
use crate::state::{ConnectionKind, GatewayState};

/// Build the gateway router: WebSockets, REST surfaces and health.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route("/ws", get(status_ws_handler))
        .route("/ws/canvas", get(canvas_ws_handler))
        .route("/ws/canvas/{canvas_id}", get(canvas_ws_handler_for))
        .route("/health", get(health_handler))
        .merge(crate::api::router())
        .merge(crate::agent::router());

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway server and run until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();
    let app = build_router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let canvas_connections = state.connection_count(ConnectionKind::Canvas).await;
    let status_connections = state.connection_count(ConnectionKind::Status).await;
    let agent_connections = state.connection_count(ConnectionKind::Agent).await;
    let canvases = state.canvas.store().canvas_ids().await.len();
    let canvas_bus = state.canvas.bus().stats();
    let status_bus = state.status.stats();

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "connections": canvas_connections + status_connections + agent_connections,
        "canvas_connections": canvas_connections,
        "status_connections": status_connections,
        "agent_connections": agent_connections,
        "canvases": canvases,
        "bus": {
            "canvas": {
                "subscribers": canvas_bus.subscribers,
                "published": canvas_bus.published,
                "dropped": canvas_bus.dropped,
            },
            "status": {
                "subscribers": status_bus.subscribers,
                "published": status_bus.published,
                "dropped": status_bus.dropped,
            },
        },
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> axum::response::Response {
    let Some(handle) = state.metrics.as_ref() else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };
    crate::metrics::record_bus_stats("canvas", state.canvas.bus().stats());
    crate::metrics::record_bus_stats("status", state.status.stats());
    handle.render().into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
