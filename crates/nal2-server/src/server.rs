//! `Nal2Server`: the control plane.
//!
//! One instance owns its configuration, engine bridge, and session
//! registry. `start` and `stop` are idempotent and serialized against each
//! other; every run gets a fresh listener, worker pool, and cancellation
//! tokens, while the registry (and so the `client_<n>` sequence) lives as
//! long as the instance.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use nal2_core::Engine;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::acceptor;
use crate::bridge::EngineBridge;
use crate::config::ServerConfig;
use crate::connection::ConnectionContext;
use crate::error::ServerError;
use crate::net;
use crate::pool::WorkerPool;
use crate::websocket::{SessionEvent, SessionInfo, SessionRegistry};

/// Reply to a successful `start`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReport {
    pub success: bool,
    pub port: u16,
    pub local_address: String,
}

/// Reply to `stop`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub success: bool,
}

/// Reply to a control call that failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ControlFailure {
    pub success: bool,
    pub error: String,
}

impl From<&ServerError> for ControlFailure {
    fn from(err: &ServerError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
        }
    }
}

/// Live snapshot returned by `status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub is_running: bool,
    pub port: u16,
    /// Open WebSocket sessions.
    pub connections: usize,
    /// Connections currently held by a worker.
    pub active_requests: usize,
    pub local_address: String,
    /// Open sessions ordered by id.
    pub sessions: Vec<SessionInfo>,
}

/// Resources of one `start`..`stop` run.
struct Running {
    port: u16,
    local_address: String,
    /// Stops the acceptor.
    accept_token: CancellationToken,
    /// Closes sessions that outlive the drain.
    session_token: CancellationToken,
    pool: Arc<WorkerPool>,
    sessions: TaskTracker,
    acceptor: JoinHandle<()>,
}

impl Running {
    /// False once the acceptor has exited, by cancellation or a fatal
    /// accept error.
    fn is_live(&self) -> bool {
        !self.acceptor.is_finished()
    }
}

struct State {
    running: Option<Running>,
    /// Port of the current or most recent run.
    port: u16,
}

pub struct Nal2Server {
    config: Arc<ServerConfig>,
    bridge: EngineBridge,
    registry: Arc<SessionRegistry>,
    state: Mutex<State>,
}

impl Nal2Server {
    pub fn new(config: ServerConfig, engine: Arc<dyn Engine>) -> Self {
        let bridge = EngineBridge::new(engine, config.engine_timeout());
        let registry = Arc::new(SessionRegistry::new(config.session_queue));
        let port = config.port;
        Self {
            config: Arc::new(config),
            bridge,
            registry,
            state: Mutex::new(State {
                running: None,
                port,
            }),
        }
    }

    /// Bind `port` (0 picks a free one) and start serving.
    ///
    /// When already running this reports the current run and binds nothing.
    /// A run whose acceptor has died is torn down and replaced.
    pub async fn start(&self, port: u16) -> Result<StartReport, ServerError> {
        let mut state = self.state.lock().await;
        if let Some(running) = state.running.take() {
            if running.is_live() {
                info!(port = running.port, "server already running");
                let report = StartReport {
                    success: true,
                    port: running.port,
                    local_address: running.local_address.clone(),
                };
                state.running = Some(running);
                return Ok(report);
            }
            warn!(port = running.port, "acceptor exited, restarting");
            let _ = self.teardown(running).await;
        }

        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.host.clone()))?;
        let listener = acceptor::bind(SocketAddr::new(ip, port))?;
        let bound = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: format!("{ip}:{port}"),
            source,
        })?;
        let local_address = net::local_address(&self.config.host);

        let accept_token = CancellationToken::new();
        let session_token = CancellationToken::new();
        let sessions = TaskTracker::new();
        let pool = Arc::new(WorkerPool::new(self.config.max_workers));
        let ctx = Arc::new(ConnectionContext {
            config: Arc::clone(&self.config),
            bridge: self.bridge.clone(),
            registry: Arc::clone(&self.registry),
            sessions: sessions.clone(),
            shutdown: session_token.clone(),
        });
        let acceptor = tokio::spawn(acceptor::run_acceptor(
            listener,
            Arc::clone(&pool),
            ctx,
            accept_token.clone(),
        ));

        info!(
            port = bound.port(),
            local_address = %local_address,
            workers = pool.size(),
            "server started"
        );
        state.port = bound.port();
        state.running = Some(Running {
            port: bound.port(),
            local_address: local_address.clone(),
            accept_token,
            session_token,
            pool,
            sessions,
            acceptor,
        });

        Ok(StartReport {
            success: true,
            port: bound.port(),
            local_address,
        })
    }

    /// Close the listener, drain the pool, and close every session.
    /// Stopping a stopped server does nothing.
    pub async fn stop(&self) -> StopReport {
        let mut state = self.state.lock().await;
        let Some(running) = state.running.take() else {
            return StopReport { success: true };
        };
        let port = running.port;
        let closed = self.teardown(running).await;
        info!(port, sessions_closed = closed, "server stopped");
        StopReport { success: true }
    }

    /// Release one run's resources. Returns how many sessions were closed.
    async fn teardown(&self, running: Running) -> usize {
        let grace = self.config.shutdown_grace();

        running.accept_token.cancel();
        if let Err(err) = running.acceptor.await {
            warn!(error = %err, "acceptor task failed");
        }

        running.pool.shutdown(grace).await;

        // Dropping each queue lets its session send a Close frame.
        let closed = self.registry.clear();
        let _ = running.sessions.close();
        if tokio::time::timeout(grace, running.sessions.wait()).await.is_err() {
            warn!("sessions did not close in time, dropping sockets");
            running.session_token.cancel();
            running.sessions.wait().await;
        }
        running.session_token.cancel();
        closed
    }

    /// Running flag, port, live counts, and the open sessions.
    pub async fn status(&self) -> ServerStatus {
        let state = self.state.lock().await;
        let (is_running, active_requests) = match &state.running {
            Some(running) => (running.is_live(), running.pool.active()),
            None => (false, 0),
        };
        let sessions = self.registry.sessions();
        ServerStatus {
            is_running,
            port: state.port,
            connections: sessions.len(),
            active_requests,
            local_address: net::local_address(&self.config.host),
            sessions,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .running
            .as_ref()
            .is_some_and(Running::is_live)
    }

    /// Open `WebSocket` sessions ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.sessions()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Subscribe to WebSocket connect, disconnect, and message events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.registry.subscribe()
    }

    pub fn bridge(&self) -> &EngineBridge {
        &self.bridge
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Drop for Nal2Server {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().running.take() {
            running.accept_token.cancel();
            running.session_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nal2_core::Completion;

    fn echo() -> Arc<dyn Engine> {
        Arc::new(|payload: String, done: Completion| {
            let _ = done.resolve(payload);
        })
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_grace_secs: 1,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn start_reports_bound_port() {
        let server = Nal2Server::new(local_config(), echo());
        let report = server.start(0).await.unwrap();
        assert!(report.success);
        assert_ne!(report.port, 0);
        assert_eq!(report.local_address, "127.0.0.1");
        let _ = server.stop().await;
    }

    #[tokio::test]
    async fn start_twice_is_idempotent() {
        let server = Nal2Server::new(local_config(), echo());
        let first = server.start(0).await.unwrap();
        let second = server.start(0).await.unwrap();
        assert_eq!(first, second);
        let _ = server.stop().await;
    }

    #[tokio::test]
    async fn stop_when_stopped_succeeds() {
        let server = Nal2Server::new(local_config(), echo());
        assert!(server.stop().await.success);
        let _ = server.start(0).await.unwrap();
        assert!(server.stop().await.success);
        assert!(server.stop().await.success);
        assert!(!server.is_running().await);
    }

    #[tokio::test]
    async fn status_tracks_lifecycle() {
        let server = Nal2Server::new(local_config(), echo());
        let before = server.status().await;
        assert!(!before.is_running);
        assert_eq!(before.connections, 0);

        let report = server.start(0).await.unwrap();
        let during = server.status().await;
        assert!(during.is_running);
        assert_eq!(during.port, report.port);

        let _ = server.stop().await;
        let after = server.status().await;
        assert!(!after.is_running);
        assert_eq!(after.port, report.port);
    }

    async fn kill_acceptor(server: &Nal2Server) {
        let state = server.state.lock().await;
        let running = state.running.as_ref().unwrap();
        running.accept_token.cancel();
        while !running.acceptor.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn dead_acceptor_reports_not_running() {
        let server = Nal2Server::new(local_config(), echo());
        let _ = server.start(0).await.unwrap();
        kill_acceptor(&server).await;

        assert!(!server.status().await.is_running);
        assert!(!server.is_running().await);
        assert!(server.stop().await.success);
    }

    #[tokio::test]
    async fn start_after_dead_acceptor_rebinds() {
        let server = Nal2Server::new(local_config(), echo());
        let first = server.start(0).await.unwrap();
        kill_acceptor(&server).await;

        let second = server.start(0).await.unwrap();
        assert!(second.success);
        assert!(server.status().await.is_running);
        let conn = tokio::net::TcpStream::connect(("127.0.0.1", second.port)).await;
        assert!(conn.is_ok(), "new listener on {} (old {})", second.port, first.port);
        let _ = server.stop().await;
    }

    #[tokio::test]
    async fn status_lists_sessions() {
        let server = Nal2Server::new(local_config(), echo());
        let (a, _ra) = server.registry().register();
        let (b, _rb) = server.registry().register();

        let status = server.status().await;
        assert_eq!(status.connections, 2);
        let ids: Vec<_> = status.sessions.iter().map(|s| s.client_id.clone()).collect();
        assert_eq!(ids, vec![a, b.clone()]);
        assert_eq!(server.sessions().len(), 2);

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["sessions"][1]["clientId"], b.as_str());
        assert!(value["sessions"][0]["connectedAt"].is_string());
    }

    #[tokio::test]
    async fn invalid_host_is_rejected() {
        let config = ServerConfig {
            host: "not-an-ip".into(),
            ..local_config()
        };
        let server = Nal2Server::new(config, echo());
        let err = server.start(0).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
        assert!(!server.is_running().await);

        let failure = ControlFailure::from(&err);
        assert!(!failure.success);
        assert!(failure.error.contains("not-an-ip"));
    }

    #[tokio::test]
    async fn busy_port_leaves_server_stopped() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let server = Nal2Server::new(local_config(), echo());
        let err = server.start(port).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(!server.is_running().await);
    }

    #[test]
    fn payloads_serialize_camel_case() {
        let status = ServerStatus {
            is_running: true,
            port: 8080,
            connections: 2,
            active_requests: 1,
            local_address: "10.0.0.5".into(),
            sessions: Vec::new(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["isRunning"], true);
        assert_eq!(value["activeRequests"], 1);
        assert_eq!(value["localAddress"], "10.0.0.5");

        let report = StartReport {
            success: true,
            port: 8080,
            local_address: "Unknown".into(),
        };
        assert_eq!(serde_json::to_value(&report).unwrap()["localAddress"], "Unknown");
    }
}
