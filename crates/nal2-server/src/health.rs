//! Health endpoint body.

use serde::Serialize;

use crate::config::ServerConfig;

/// `{"status":"ok","server":...,"version":...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is answering.
    pub status: String,
    pub server: String,
    pub version: String,
}

pub fn health_check(config: &ServerConfig) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        server: config.server_name.clone(),
        version: config.server_version.clone(),
    }
}
