//! Metric names.
//!
//! Recorded through the `metrics` facade; the host decides whether an
//! exporter is installed.

/// Accepted TCP connections (counter).
pub const CONNECTIONS_ACCEPTED_TOTAL: &str = "connections_accepted_total";
/// Failed `accept` calls (counter).
pub const ACCEPT_ERRORS_TOTAL: &str = "accept_errors_total";
/// Connections currently being handled by a worker (gauge).
pub const CONNECTIONS_ACTIVE: &str = "connections_active";
/// Connections waiting for a worker (gauge).
pub const CONNECTIONS_QUEUED: &str = "connections_queued";
/// Worker tasks that panicked (counter).
pub const WORKER_PANICS_TOTAL: &str = "worker_panics_total";
/// HTTP responses written (counter, labels: status).
pub const HTTP_RESPONSES_TOTAL: &str = "http_responses_total";
/// Engine invocations (counter).
pub const ENGINE_CALLS_TOTAL: &str = "engine_calls_total";
/// Engine invocations that ended without a result (counter, labels: kind).
pub const ENGINE_ERRORS_TOTAL: &str = "engine_errors_total";
/// Engine round-trip latency in seconds (histogram).
pub const ENGINE_DURATION_SECONDS: &str = "engine_duration_seconds";
/// WebSocket sessions opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket sessions (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ws_sessions_active";
/// Frames that could not be queued for a session (counter).
pub const WS_SEND_FAILURES_TOTAL: &str = "ws_send_failures_total";
