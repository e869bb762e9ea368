//! REST query surface over canvas state and snapshot history.
//!
//! Snapshot and restore go through the canvas manager so connected display
//! clients see the same command frames an agent-issued command produces.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use easel_canvas::CanvasCommand;
use easel_core::error::EaselError;
use easel_core::protocol::ErrorShape;

use crate::state::GatewayState;

/// Agent id stamped on commands issued over REST.
pub const API_AGENT_ID: &str = "api";

/// Routes mounted under `/api/canvas`.
pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/canvas", get(list_canvases))
        .route("/api/canvas/{canvas_id}/state", get(get_state))
        .route(
            "/api/canvas/{canvas_id}/snapshots",
            get(list_snapshots).post(create_snapshot),
        )
        .route(
            "/api/canvas/{canvas_id}/snapshots/{snapshot_id}/restore",
            post(restore_snapshot),
        )
}

/// An [`EaselError`] rendered as `{error, code}` with a matching status.
pub struct ApiError(EaselError);

impl From<EaselError> for ApiError {
    fn from(e: EaselError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if status_for_code(self.0.code()).is_server_error() {
            warn!(error = %self.0, "Canvas API request failed");
        }
        error_response(ErrorShape::from(&self.0))
    }
}

/// HTTP status for an error code.
pub(crate) fn status_for_code(code: &str) -> StatusCode {
    match code {
        "not_found" => StatusCode::NOT_FOUND,
        "validation_error" | "protocol_error" | "json_error" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(shape: ErrorShape) -> Response {
    (status_for_code(&shape.code), Json(shape)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default)]
    pub label: Option<String>,
}

async fn list_canvases(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let canvases = state.canvas.store().canvas_ids().await;
    Json(json!({ "canvases": canvases }))
}

async fn get_state(
    State(state): State<Arc<GatewayState>>,
    Path(canvas_id): Path<String>,
) -> impl IntoResponse {
    state_body(&state, &canvas_id).await
}

async fn list_snapshots(
    State(state): State<Arc<GatewayState>>,
    Path(canvas_id): Path<String>,
) -> impl IntoResponse {
    let snapshots = state.canvas.store().get_snapshots(&canvas_id).await;
    Json(json!({
        "canvas_id": canvas_id,
        "snapshots": snapshots,
    }))
}

async fn create_snapshot(
    State(state): State<Arc<GatewayState>>,
    Path(canvas_id): Path<String>,
    body: Option<Json<SnapshotRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let label = body.and_then(|Json(req)| req.label);
    let dispatch = state
        .canvas
        .execute(
            &canvas_id,
            API_AGENT_ID,
            CanvasCommand::Snapshot {
                label,
                snapshot_id: None,
            },
        )
        .await?;
    #[cfg(feature = "metrics")]
    crate::metrics::record_canvas_dispatch(&canvas_id, &dispatch.command, dispatch.receivers);

    let snapshot_id = dispatch
        .command
        .snapshot_ids()
        .first()
        .map(|id| id.to_string())
        .ok_or_else(|| EaselError::Other(anyhow::anyhow!("snapshot id was not assigned")))?;
    let snapshot = state
        .canvas
        .store()
        .get_snapshot(&canvas_id, &snapshot_id)
        .await
        .ok_or_else(|| EaselError::NotFound(format!("snapshot {snapshot_id}")))?;

    Ok((StatusCode::CREATED, Json(snapshot.summary())))
}

async fn restore_snapshot(
    State(state): State<Arc<GatewayState>>,
    Path((canvas_id, snapshot_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let dispatch = state
        .canvas
        .execute(&canvas_id, API_AGENT_ID, CanvasCommand::Restore { snapshot_id })
        .await?;
    #[cfg(feature = "metrics")]
    crate::metrics::record_canvas_dispatch(&canvas_id, &dispatch.command, dispatch.receivers);
    debug!(canvas_id = %canvas_id, receivers = dispatch.receivers, "Snapshot restored");
    Ok(state_body(&state, &canvas_id).await)
}

async fn state_body(state: &GatewayState, canvas_id: &str) -> Json<serde_json::Value> {
    let elements = state.canvas.elements(canvas_id).await;
    Json(json!({
        "canvas_id": canvas_id,
        "element_count": elements.len(),
        "elements": elements,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use easel_canvas::model::{ButtonElement, ButtonVariant, CanvasElement};
    use easel_core::config::Config;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<GatewayState>) {
        let state = Arc::new(GatewayState::new(Arc::new(Config::default())));
        (router().with_state(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn render_button(state: &GatewayState, canvas_id: &str, id: &str) {
        state
            .canvas
            .execute(
                canvas_id,
                "agent",
                CanvasCommand::Render {
                    id: id.into(),
                    element: CanvasElement::Button(ButtonElement {
                        label: "Go".into(),
                        variant: ButtonVariant::Primary,
                        disabled: false,
                        action: None,
                    }),
                    position: None,
                    class: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_canvas_is_empty() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/api/canvas/nope/state", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["element_count"], 0);
        assert_eq!(body["elements"], json!([]));

        let (_, body) = send(&app, "GET", "/api/canvas/nope/snapshots", None).await;
        assert_eq!(body["snapshots"], json!([]));
    }

    #[tokio::test]
    async fn test_snapshot_reset_restore() {
        let (app, state) = app();
        render_button(&state, "c1", "btn1").await;

        let (status, summary) = send(
            &app,
            "POST",
            "/api/canvas/c1/snapshots",
            Some(json!({"label": "before"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(summary["label"], "before");
        assert_eq!(summary["element_count"], 1);
        let snapshot_id = summary["id"].as_str().unwrap().to_string();

        state.canvas.execute("c1", "agent", CanvasCommand::Reset).await.unwrap();
        let (_, body) = send(&app, "GET", "/api/canvas/c1/state", None).await;
        assert_eq!(body["element_count"], 0);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/canvas/c1/snapshots/{snapshot_id}/restore"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["element_count"], 1);
        assert_eq!(body["elements"][0]["id"], "btn1");

        let (_, body) = send(&app, "GET", "/api/canvas/c1/snapshots", None).await;
        assert_eq!(body["snapshots"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_without_body() {
        let (app, _) = app();
        let (status, summary) = send(&app, "POST", "/api/canvas/c1/snapshots", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(summary["element_count"], 0);
        assert!(summary.get("label").is_none());
    }

    #[tokio::test]
    async fn test_restore_unknown_snapshot_is_404() {
        let (app, _) = app();
        let (status, body) = send(&app, "POST", "/api/canvas/c1/snapshots/ghost/restore", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_list_canvases() {
        let (app, state) = app();
        render_button(&state, "b", "x").await;
        render_button(&state, "a", "x").await;
        let (_, body) = send(&app, "GET", "/api/canvas", None).await;
        assert_eq!(body["canvases"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_rest_restore_publishes_command_and_state() {
        let (app, state) = app();
        render_button(&state, "c1", "btn1").await;
        let (_, summary) = send(&app, "POST", "/api/canvas/c1/snapshots", None).await;
        let snapshot_id = summary["id"].as_str().unwrap().to_string();

        let mut sub = state.canvas.subscribe("c1");
        send(
            &app,
            "POST",
            &format!("/api/canvas/c1/snapshots/{snapshot_id}/restore"),
            None,
        )
        .await;

        let first = sub.try_recv().unwrap();
        let easel_canvas::ServerFrame::Command { agent_id, .. } = &first.payload else {
            panic!("expected command frame");
        };
        assert_eq!(agent_id, API_AGENT_ID);
        assert!(matches!(
            sub.try_recv().unwrap().payload,
            easel_canvas::ServerFrame::State { .. }
        ));
    }
}
