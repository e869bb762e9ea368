//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 18790;

/// Default per-subscriber queue depth on the topic bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default undo/redo depth for client history stores.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Top-level Easel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Bounded queue depth per bus subscriber. Messages beyond it are dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,

    /// Snapshots kept per canvas (oldest evicted first). Unset = unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_snapshots: Option<usize>,

    /// Undo/redo depth used by `easel watch`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::EaselError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        json5::from_str(&substituted).map_err(|e| crate::error::EaselError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn channel_capacity(&self) -> usize {
        self.canvas
            .as_ref()
            .and_then(|c| c.channel_capacity)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn max_snapshots(&self) -> Option<usize> {
        self.canvas.as_ref().and_then(|c| c.max_snapshots)
    }

    pub fn history_limit(&self) -> usize {
        self.canvas
            .as_ref()
            .and_then(|c| c.history_limit)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn log_level(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().is_some_and(|l| l.json)
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "canvas.max_snapshots").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if let Some(canvas) = &self.canvas {
            if canvas.channel_capacity == Some(0) {
                errors.push("canvas.channel_capacity must be at least 1".to_string());
            }
            if canvas.history_limit == Some(0) {
                warnings.push("canvas.history_limit is 0; undo is disabled".to_string());
            }
            match canvas.max_snapshots {
                Some(0) => errors.push("canvas.max_snapshots must be at least 1".to_string()),
                Some(n) if n > 10_000 => warnings.push(format!(
                    "canvas.max_snapshots is {n}; snapshots are held in memory"
                )),
                _ => {}
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Easel data: `~/.easel/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".easel")
}
