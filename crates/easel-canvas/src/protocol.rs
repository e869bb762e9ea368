//! Canvas connection frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use easel_core::protocol::ErrorShape;

use crate::model::{CanvasCommand, CanvasElementState, CanvasInteraction};

/// Topic kind under which canvas frames are published.
pub const CANVAS_TOPIC_KIND: &str = "canvas";

/// Bus topic for one canvas: `canvas:{canvas_id}`.
pub fn canvas_topic(canvas_id: &str) -> String {
    format!("{CANVAS_TOPIC_KIND}:{canvas_id}")
}

/// Client -> Server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        canvas_id: String,
    },
    Unsubscribe {
        canvas_id: String,
    },
    Interaction {
        canvas_id: String,
        interaction: CanvasInteraction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

/// Server -> Client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// An applied command, forwarded verbatim.
    Command {
        canvas_id: String,
        command: CanvasCommand,
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Full element list; sent on subscribe and after a restore.
    State {
        canvas_id: String,
        elements: Vec<CanvasElementState>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.map(str::to_string),
        }
    }

    pub fn canvas_id(&self) -> Option<&str> {
        match self {
            Self::Command { canvas_id, .. } | Self::State { canvas_id, .. } => Some(canvas_id),
            Self::Error { .. } => None,
        }
    }
}

/// An interaction handed to the agent that owns the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedInteraction {
    pub canvas_id: String,
    pub interaction: CanvasInteraction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Frame on an agent connection (`/ws/agent/{canvas_id}`).
///
/// Agents send `req` frames and get exactly one `res` back per request id.
/// Interactions from the displays of the claimed canvas arrive unprompted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentFrame {
    #[serde(rename = "req")]
    Request {
        id: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<serde_json::Value>,
    },

    #[serde(rename = "res")]
    Response {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorShape>,
    },

    #[serde(rename = "interaction")]
    Interaction(RoutedInteraction),
}

impl AgentFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Response {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                error: message.into(),
                code: code.into(),
            }),
        }
    }
}
