//! Status event bus served on `/ws`.
//!
//! Clients start with no topics, which receives everything, and narrow the
//! stream with `subscribe`/`unsubscribe` frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use easel_canvas::Subscription;
use easel_core::error::EaselError;
use easel_core::protocol::{StatusFrame, TopicRequest};

use crate::state::{ConnectionKind, GatewayState};

/// Publish a status event to every matching `/ws` client.
pub fn publish_status(state: &GatewayState, topic: &str, payload: serde_json::Value) -> usize {
    let receivers = state.status.publish(topic, StatusFrame::event(topic, payload));
    #[cfg(feature = "metrics")]
    crate::metrics::record_publish(topic, receivers);
    debug!(topic, receivers, "Status event published");
    receivers
}

pub async fn status_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_status_connection(state, socket))
}

async fn handle_status_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "Status client connected");
    state.register_connection(&conn_id, ConnectionKind::Status).await;

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut subscription = state.status.subscribe(Vec::<String>::new());
    let cancel = CancellationToken::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<TopicRequest>(text.as_str()) {
                        Ok(request) => apply_topic_request(&conn_id, &mut subscription, request),
                        Err(e) => {
                            let err = EaselError::Protocol(e.to_string());
                            debug!(conn_id = %conn_id, error = %err, "Dropped malformed frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => cancel.cancel(),
                Some(Ok(_)) => {}
            },
            envelope = subscription.recv() => {
                let Some(envelope) = envelope else { break };
                let msg = match serde_json::to_string(&envelope.payload) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::error!(%e, "Failed to serialize status frame");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                    cancel.cancel();
                }
            }
        }
    }

    drop(subscription);
    state.cleanup_connection(&conn_id).await;
    info!(conn_id = %conn_id, "Status client disconnected");
}

fn apply_topic_request(
    conn_id: &str,
    subscription: &mut Subscription<StatusFrame>,
    request: TopicRequest,
) {
    match request {
        TopicRequest::Subscribe { topics } => {
            let added = subscription.add_topics(topics);
            debug!(conn_id, added, topics = ?subscription.topics(), "Status topics added");
        }
        TopicRequest::Unsubscribe { topics } => {
            let removed = subscription.remove_topics(topics);
            debug!(conn_id, removed, topics = ?subscription.topics(), "Status topics removed");
        }
    }
}
