//! Agent-facing surface.
//!
//! `POST /api/canvas/{canvas_id}/commands` runs one canvas tool call and
//! `GET /api/tools` lists the tool definitions. `/ws/agent/{canvas_id}` claims
//! the canvas's interaction stream and answers `req` frames (`canvas`,
//! `state`, `tools.list`) with `res` frames on the same socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use easel_canvas::AgentFrame;
use easel_core::error::EaselError;
use easel_core::protocol::ErrorShape;
use easel_tools::ToolContext;

use crate::api::{error_response, API_AGENT_ID};
use crate::state::{ConnectionKind, GatewayState};

/// Agent id used on `/ws/agent` when the client does not name itself.
pub const DEFAULT_AGENT_ID: &str = "agent";

const CANVAS_TOOL: &str = "canvas";

#[derive(Debug, Default, Deserialize)]
pub struct AgentQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl AgentQuery {
    fn agent_id_or(self, default: &str) -> String {
        self.agent_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/canvas/{canvas_id}/commands", post(run_command))
        .route("/ws/agent/{canvas_id}", get(agent_ws_handler))
}

/// Run the canvas tool against `canvas_id`.
///
/// The canvas id from the route overrides any `canvas_id` in `params`.
/// On success returns the tool's `{success, canvas_id, command, receivers}`.
pub async fn invoke_canvas_tool(
    state: &GatewayState,
    canvas_id: &str,
    agent_id: &str,
    params: Value,
) -> Result<Value, ErrorShape> {
    let Value::Object(mut params) = params else {
        let err = EaselError::Validation("tool arguments must be an object".into());
        return Err(ErrorShape::from(&err));
    };
    params.insert("canvas_id".into(), json!(canvas_id));

    let context = ToolContext {
        session_key: canvas_id.to_string(),
        agent_id: agent_id.to_string(),
        config: state.config.clone(),
    };
    let output = state
        .tools
        .invoke(CANVAS_TOOL, Value::Object(params), &context)
        .await
        .map_err(|e| ErrorShape::from(&EaselError::Other(e)))?;
    let body: Value = serde_json::from_str(&output.content)
        .map_err(|e| ErrorShape::from(&EaselError::Json(e)))?;

    if output.is_error {
        return Err(ErrorShape {
            error: body["error"]
                .as_str()
                .unwrap_or("canvas command failed")
                .to_string(),
            code: body["code"].as_str().unwrap_or("internal_error").to_string(),
        });
    }

    #[cfg(feature = "metrics")]
    record_tool_dispatch(canvas_id, &body);

    Ok(body)
}

#[cfg(feature = "metrics")]
fn record_tool_dispatch(canvas_id: &str, body: &Value) {
    let Ok(command) = serde_json::from_value::<easel_canvas::CanvasCommand>(body["command"].clone())
    else {
        return;
    };
    let receivers = body["receivers"].as_u64().unwrap_or(0) as usize;
    crate::metrics::record_canvas_dispatch(canvas_id, &command, receivers);
}

async fn list_tools(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "names": state.tools.list(),
        "tools": state.tools.to_llm_tools(),
    }))
}

async fn run_command(
    State(state): State<Arc<GatewayState>>,
    Path(canvas_id): Path<String>,
    Query(query): Query<AgentQuery>,
    Json(params): Json<Value>,
) -> Response {
    let agent_id = query.agent_id_or(API_AGENT_ID);
    match invoke_canvas_tool(&state, &canvas_id, &agent_id, params).await {
        Ok(body) => Json(body).into_response(),
        Err(shape) => {
            debug!(
                canvas_id = %canvas_id,
                agent_id = %agent_id,
                code = %shape.code,
                "Canvas command rejected"
            );
            error_response(shape)
        }
    }
}

/// WebSocket upgrade for `/ws/agent/{canvas_id}`.
pub async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    Path(canvas_id): Path<String>,
    Query(query): Query<AgentQuery>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    let agent_id = query.agent_id_or(DEFAULT_AGENT_ID);
    ws.on_upgrade(move |socket| handle_agent_connection(state, canvas_id, agent_id, socket))
}

async fn handle_agent_connection(
    state: Arc<GatewayState>,
    canvas_id: String,
    agent_id: String,
    ws: WebSocket,
) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, canvas_id = %canvas_id, agent_id = %agent_id, "Agent connected");
    state.register_connection(&conn_id, ConnectionKind::Agent).await;

    let mut interactions = state.interactions.register(&canvas_id);
    let mut claimed = true;
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        let frame = tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<AgentFrame>(text.as_str()) {
                    Ok(AgentFrame::Request { id, method, params }) => {
                        handle_request(&state, &canvas_id, &agent_id, &id, &method, params).await
                    }
                    Ok(_) => AgentFrame::err("", "protocol_error", "agents may only send req frames"),
                    Err(e) => AgentFrame::err("", "protocol_error", e.to_string()),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, %e, "Agent read error");
                    break;
                }
                Some(Ok(_)) => continue,
            },
            routed = interactions.recv(), if claimed => match routed {
                Some(routed) => AgentFrame::Interaction(routed),
                None => {
                    // Another agent registered for this canvas.
                    info!(conn_id = %conn_id, canvas_id = %canvas_id, "Interaction route taken over");
                    claimed = false;
                    continue;
                }
            },
        };

        if let Err(e) = send_frame(&mut ws_tx, &frame).await {
            debug!(conn_id = %conn_id, %e, "Agent write failed");
            break;
        }
    }

    // Dropping the receiver closes the route; the router prunes it lazily
    // so a newer agent's registration is never removed here.
    drop(interactions);
    let _ = ws_tx.send(Message::Close(None)).await;
    state.cleanup_connection(&conn_id).await;
    info!(conn_id = %conn_id, "Agent disconnected");
}

async fn handle_request(
    state: &GatewayState,
    canvas_id: &str,
    agent_id: &str,
    id: &str,
    method: &str,
    params: Option<Value>,
) -> AgentFrame {
    debug!(canvas_id, method, "Dispatching agent request");
    match method {
        "canvas" => {
            let params = params.unwrap_or_else(|| json!({}));
            match invoke_canvas_tool(state, canvas_id, agent_id, params).await {
                Ok(payload) => AgentFrame::ok(id, payload),
                Err(error) => AgentFrame::Response {
                    id: id.to_string(),
                    ok: false,
                    payload: None,
                    error: Some(error),
                },
            }
        }
        "state" => {
            let elements = state.canvas.elements(canvas_id).await;
            AgentFrame::ok(id, json!({"canvas_id": canvas_id, "elements": elements}))
        }
        "tools.list" => AgentFrame::ok(id, json!({"tools": state.tools.to_llm_tools()})),
        other => AgentFrame::err(id, "unknown_method", format!("unknown method '{other}'")),
    }
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &AgentFrame,
) -> Result<(), axum::Error> {
    let msg = match serde_json::to_string(frame) {
        Ok(m) => m,
        Err(e) => {
            warn!(%e, "Failed to serialize agent frame");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(msg.into())).await
}
