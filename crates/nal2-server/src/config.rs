//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one [`crate::Nal2Server`] instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port used when `start` is not given one (default `8080`).
    pub port: u16,
    /// Connections handled concurrently; the rest wait in a queue.
    pub max_workers: usize,
    /// Seconds the bridge waits for an engine completion.
    pub engine_timeout_secs: u64,
    /// Seconds a client has to deliver its request.
    pub read_timeout_secs: u64,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Outbound frames buffered per WebSocket session.
    pub session_queue: usize,
    /// Seconds between server-initiated WebSocket pings.
    pub ping_interval_secs: u64,
    /// Name reported by the health endpoint.
    pub server_name: String,
    /// Version reported by the health endpoint.
    pub server_version: String,
    /// Seconds `stop` waits for in-flight connections before aborting them.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_workers: 10,
            engine_timeout_secs: 30,
            read_timeout_secs: 10,
            max_body_bytes: 16 * 1024 * 1024, // 16 MB
            session_queue: 256,
            ping_interval_secs: 30,
            server_name: "FuncApp4NAL2".into(),
            server_version: "2.0.0".into(),
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
