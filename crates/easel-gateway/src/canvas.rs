//! Canvas WebSocket handler.
//!
//! `/ws/canvas` waits for a `subscribe` frame; `/ws/canvas/{canvas_id}`
//! subscribes on connect. Each connection runs an inbound loop (client frames)
//! and an outbound loop (bus frames) that share a cancellation token. The
//! outbound loop is the only owner of the bus subscription: the inbound loop
//! hands it subscribe/unsubscribe requests over a control channel.

use std::sync::Arc;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
};
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use easel_canvas::{canvas_topic, ClientFrame, Envelope, RoutedInteraction, ServerFrame, Subscription};
use easel_core::error::EaselError;

use crate::interactions::dispatch_interaction;
use crate::state::{ConnectionKind, GatewayState};

const CONTROL_CAPACITY: usize = 32;

/// Requests from the inbound loop to the subscription owner.
#[derive(Debug)]
enum Control {
    Subscribe(String),
    Unsubscribe(String),
    Reject { message: String, code: &'static str },
}

/// Connection lifecycle. `Closing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Subscribed,
    Closing,
}

/// WebSocket upgrade for `/ws/canvas`.
pub async fn canvas_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_canvas_connection(state, None, socket))
}

/// WebSocket upgrade for `/ws/canvas/{canvas_id}`.
pub async fn canvas_ws_handler_for(
    ws: WebSocketUpgrade,
    Path(canvas_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_canvas_connection(state, Some(canvas_id), socket))
}

async fn handle_canvas_connection(
    state: Arc<GatewayState>,
    initial: Option<String>,
    ws: WebSocket,
) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, canvas_id = ?initial, "Canvas client connected");
    state.register_connection(&conn_id, ConnectionKind::Canvas).await;

    let (ws_tx, ws_rx) = ws.split();
    let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
    let cancel = CancellationToken::new();

    let outbound = Outbound {
        state: state.clone(),
        conn_id: conn_id.clone(),
        ws_tx,
        subscription: None,
        canvases: Vec::new(),
        phase: Phase::Connecting,
    };
    let send_task = tokio::spawn(outbound.run(control_rx, cancel.clone(), initial));

    inbound_loop(&state, &conn_id, ws_rx, control_tx, &cancel).await;

    cancel.cancel();
    if let Err(e) = send_task.await {
        warn!(conn_id = %conn_id, %e, "Canvas send task failed");
    }
    state.cleanup_connection(&conn_id).await;
    info!(conn_id = %conn_id, "Canvas client disconnected");
}

/// Read client frames until the client leaves or the outbound side stops.
async fn inbound_loop(
    state: &GatewayState,
    conn_id: &str,
    mut ws_rx: SplitStream<WebSocket>,
    control_tx: mpsc::Sender<Control>,
    cancel: &CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = ws_rx.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let frame = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(f) => f,
                    Err(e) => {
                        let err = EaselError::Protocol(e.to_string());
                        debug!(conn_id, error = %err, "Dropped malformed frame");
                        continue;
                    }
                };
                if handle_client_frame(state, frame, &control_tx).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(conn_id, "Client requested close");
                break;
            }
            Some(Err(e)) => {
                debug!(conn_id, %e, "WebSocket read error");
                break;
            }
            // Binary frames are not part of the protocol; pings are answered by axum.
            Some(Ok(_)) => {}
        }
    }
}

/// Returns `Err` once the outbound loop has gone away.
async fn handle_client_frame(
    state: &GatewayState,
    frame: ClientFrame,
    control_tx: &mpsc::Sender<Control>,
) -> Result<(), mpsc::error::SendError<Control>> {
    match frame {
        ClientFrame::Subscribe { canvas_id } if canvas_id.is_empty() => {
            control_tx
                .send(Control::Reject {
                    message: "canvas_id must not be empty".into(),
                    code: "validation_error",
                })
                .await
        }
        ClientFrame::Subscribe { canvas_id } => control_tx.send(Control::Subscribe(canvas_id)).await,
        ClientFrame::Unsubscribe { canvas_id } => {
            control_tx.send(Control::Unsubscribe(canvas_id)).await
        }
        ClientFrame::Interaction {
            canvas_id,
            interaction,
            session_id,
        } => {
            dispatch_interaction(
                state,
                RoutedInteraction {
                    canvas_id,
                    interaction,
                    session_id,
                    received_at: Utc::now(),
                },
            );
            Ok(())
        }
    }
}

/// The write half of a canvas connection and the subscription it owns.
struct Outbound {
    state: Arc<GatewayState>,
    conn_id: String,
    ws_tx: SplitSink<WebSocket, Message>,
    subscription: Option<Subscription<ServerFrame>>,
    canvases: Vec<String>,
    phase: Phase,
}

impl Outbound {
    async fn run(
        mut self,
        mut control_rx: mpsc::Receiver<Control>,
        cancel: CancellationToken,
        initial: Option<String>,
    ) {
        // Ending this loop for any reason ends the inbound loop too.
        let _guard = cancel.clone().drop_guard();

        if let Some(canvas_id) = initial {
            if self.subscribe(canvas_id).await.is_err() {
                return self.close().await;
            }
        }

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                control = control_rx.recv() => match control {
                    Some(Control::Subscribe(canvas_id)) => self.subscribe(canvas_id).await,
                    Some(Control::Unsubscribe(canvas_id)) => {
                        self.unsubscribe(&canvas_id);
                        Ok(())
                    }
                    Some(Control::Reject { message, code }) => {
                        self.send(&ServerFrame::error(message, Some(code))).await
                    }
                    None => break,
                },
                envelope = next_frame(&mut self.subscription) => match envelope {
                    Some(envelope) => self.send(&envelope.payload).await,
                    None => break,
                },
            };
            if let Err(e) = result {
                debug!(conn_id = %self.conn_id, %e, "Canvas write failed");
                break;
            }
        }

        self.close().await;
    }

    /// Register the topic, read the store, then write the full state.
    async fn subscribe(&mut self, canvas_id: String) -> Result<(), axum::Error> {
        let topic = canvas_topic(&canvas_id);
        match self.subscription.as_mut() {
            Some(sub) => {
                sub.add_topics([topic]);
            }
            None => {
                self.subscription = Some(self.state.canvas.bus().subscribe([topic]));
            }
        }
        if !self.canvases.contains(&canvas_id) {
            self.canvases.push(canvas_id.clone());
        }
        self.phase = Phase::Subscribed;

        let frame = self.state.canvas.state_frame(&canvas_id).await;
        info!(conn_id = %self.conn_id, canvas_id = %canvas_id, "Canvas subscribed");
        self.send(&frame).await
    }

    fn unsubscribe(&mut self, canvas_id: &str) {
        let Some(position) = self.canvases.iter().position(|c| c == canvas_id) else {
            debug!(conn_id = %self.conn_id, canvas_id, "Unsubscribe for unknown canvas");
            return;
        };
        self.canvases.remove(position);

        if self.canvases.is_empty() {
            // An empty topic set would match every canvas.
            self.subscription = None;
            self.phase = Phase::Connecting;
        } else if let Some(sub) = self.subscription.as_mut() {
            sub.remove_topics([canvas_topic(canvas_id)]);
        }
        info!(conn_id = %self.conn_id, canvas_id, phase = ?self.phase, "Canvas unsubscribed");
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), axum::Error> {
        let msg = match serde_json::to_string(frame) {
            Ok(m) => m,
            Err(e) => {
                warn!(conn_id = %self.conn_id, %e, "Failed to serialize canvas frame");
                return Ok(());
            }
        };
        self.ws_tx.send(Message::Text(msg.into())).await
    }

    async fn close(mut self) {
        self.phase = Phase::Closing;
        self.subscription = None;
        let _ = self.ws_tx.send(Message::Close(None)).await;
        debug!(conn_id = %self.conn_id, phase = ?self.phase, "Canvas outbound closed");
    }
}

/// Next frame from the subscription. Pends forever while unsubscribed.
async fn next_frame(
    subscription: &mut Option<Subscription<ServerFrame>>,
) -> Option<Arc<Envelope<ServerFrame>>> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
