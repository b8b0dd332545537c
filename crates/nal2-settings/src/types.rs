//! Settings types.
//!
//! All structs deserialize with `#[serde(default)]`, so a settings file
//! only needs the keys it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object (`~/.nal2/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Nal2Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl Nal2Settings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.max_workers == 0 {
            return Err(SettingsError::InvalidValue {
                key: "server.maxWorkers",
                reason: "must be at least 1",
            });
        }
        if s.engine_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue {
                key: "server.engineTimeoutSecs",
                reason: "must be at least 1",
            });
        }
        if s.session_queue == 0 {
            return Err(SettingsError::InvalidValue {
                key: "server.sessionQueue",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Network and runtime settings for the embedded server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port; `0` picks an ephemeral port.
    pub port: u16,
    /// Concurrent connection handlers.
    pub max_workers: usize,
    /// Seconds to wait for an engine completion.
    pub engine_timeout_secs: u64,
    /// Seconds allowed for a client to send its request.
    pub read_timeout_secs: u64,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Outbound frames buffered per WebSocket session.
    pub session_queue: usize,
    /// Seconds `stop()` waits for in-flight connections.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_workers: 10,
            engine_timeout_secs: 30,
            read_timeout_secs: 10,
            max_body_bytes: 16 * 1024 * 1024,
            session_queue: 256,
            shutdown_grace_secs: 5,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Per-target levels layered over `level`, e.g. `{"nal2_server": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
