use thiserror::Error;

use crate::protocol::ErrorShape;

#[derive(Debug, Error)]
pub enum EaselError {
    /// Unknown command kind, unknown element type, or a missing required field.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A message was dropped for a subscriber whose queue was full.
    #[error("Slow consumer: subscriber {subscriber} dropped message on '{topic}'")]
    SlowConsumer { subscriber: u64, topic: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EaselError {
    /// Short machine-readable code used in `error` frames and REST responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::SlowConsumer { .. } => "slow_consumer",
            Self::Protocol(_) => "protocol_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Other(_) => "internal_error",
        }
    }
}

impl From<&EaselError> for ErrorShape {
    fn from(e: &EaselError) -> Self {
        Self {
            error: e.to_string(),
            code: e.code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EaselError>;
