//! `easel watch`: a terminal display client.
//!
//! Mirrors one canvas through a [`HistoryStore`] and prints every frame and
//! the resulting element list. Typing `undo`, `redo` or `quit` on stdin steps
//! through the local history.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use easel_canvas::model::CanvasElement;
use easel_canvas::{CanvasElementState, ClientFrame, HistoryStore, ServerFrame};

pub async fn run(
    base_url: &str,
    canvas_id: &str,
    history_limit: usize,
    max_snapshots: Option<usize>,
) -> anyhow::Result<()> {
    let url = format!("{}/ws/canvas", base_url.trim_end_matches('/'));
    let (ws, _) = connect_async(&url).await?;
    info!(%url, canvas_id, "Connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let subscribe = serde_json::to_string(&ClientFrame::Subscribe {
        canvas_id: canvas_id.to_string(),
    })?;
    ws_tx.send(Message::Text(subscribe.into())).await?;

    let mut history =
        HistoryStore::with_capacity(canvas_id, history_limit).with_max_snapshots(max_snapshots);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = match serde_json::from_str::<ServerFrame>(text.as_str()) {
                        Ok(f) => f,
                        Err(e) => {
                            debug!(%e, "Ignoring unparseable frame");
                            continue;
                        }
                    };
                    println!("{}", describe_frame(&frame));
                    if history.apply_frame(&frame) {
                        print_elements(history.elements());
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    println!("Connection closed by gateway");
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(_)) => {}
            },
            line = stdin.next_line(), if stdin_open => match line?.as_deref().map(str::trim) {
                Some("undo") => {
                    if history.undo() {
                        print_elements(history.elements());
                    } else {
                        println!("Nothing to undo");
                    }
                }
                Some("redo") => {
                    if history.redo() {
                        print_elements(history.elements());
                    } else {
                        println!("Nothing to redo");
                    }
                }
                Some("quit") => break,
                Some("") => {}
                Some(other) => println!("Unknown input '{other}' (undo, redo, quit)"),
                None => stdin_open = false,
            },
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    Ok(())
}

fn describe_frame(frame: &ServerFrame) -> String {
    match frame {
        ServerFrame::Command {
            canvas_id,
            command,
            agent_id,
            timestamp,
        } => format!(
            "[{}] {canvas_id}: {} from {agent_id}",
            timestamp.format("%H:%M:%S"),
            command.kind()
        ),
        ServerFrame::State {
            canvas_id,
            elements,
        } => format!("{canvas_id}: state with {} element(s)", elements.len()),
        ServerFrame::Error { message, code } => match code {
            Some(code) => format!("error ({code}): {message}"),
            None => format!("error: {message}"),
        },
    }
}

fn print_elements(elements: &[CanvasElementState]) {
    if elements.is_empty() {
        println!("  (empty)");
    }
    for el in elements {
        println!("  {}", describe_element(el));
    }
}

fn describe_element(state: &CanvasElementState) -> String {
    let body = match &state.element {
        CanvasElement::Text(t) => t.content.clone(),
        CanvasElement::Button(b) => format!("[{}]", b.label),
        CanvasElement::Input(i) => i.label.clone().unwrap_or_else(|| i.placeholder.clone()),
        CanvasElement::Image(i) => i.src.clone(),
        CanvasElement::Code(c) => format!("{} line(s) of {}", c.code.lines().count(), c.language),
        CanvasElement::Table(t) => format!("{} column(s), {} row(s)", t.columns.len(), t.rows.len()),
        CanvasElement::Form(f) => format!("{} field(s)", f.fields.len()),
        CanvasElement::Chart(c) => c
            .title
            .clone()
            .unwrap_or_else(|| format!("{} point(s)", c.data.len())),
    };
    let class = state
        .class
        .as_deref()
        .map(|c| format!(" .{c}"))
        .unwrap_or_default();
    format!(
        "{:>3} {} <{}>{class} {body}",
        state.position,
        state.id,
        state.element.type_name()
    )
}
