//! Status bus wire protocol.
//!
//! The `/ws` endpoint carries JSON text frames. Clients narrow what they
//! receive with `subscribe`/`unsubscribe`; the server pushes `event` frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic used for agent lifecycle events.
pub const TOPIC_AGENT_STATUS: &str = "agent_status";

/// Topic used for channel connectivity events.
pub const TOPIC_CHANNEL_STATUS: &str = "channel_status";

/// Topic kind for interactions mirrored from canvas clients.
pub const TOPIC_CANVAS_INTERACTION: &str = "canvas_interaction";

/// Client -> Server frame on the status bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TopicRequest {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
}

/// Server -> Client frame on the status bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusFrame {
    Event {
        topic: String,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl StatusFrame {
    pub fn event(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Event {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Error body returned by the REST surface and agent responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub error: String,
    pub code: String,
}
