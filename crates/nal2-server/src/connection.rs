//! Per-connection handling: read one request, route it, answer, close.
//!
//! Engine requests and upgrades take ownership of the socket and close it
//! themselves; every other branch falls through to the common close at
//! the end of [`handle_connection`].

use std::net::SocketAddr;
use std::sync::Arc;

use metrics::counter;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, warn};

use crate::bridge::EngineBridge;
use crate::config::ServerConfig;
use crate::health;
use crate::http::{self, Request, Response};
use crate::metrics::HTTP_RESPONSES_TOTAL;
use crate::router::{self, Route};
use crate::websocket::{session, upgrade, SessionRegistry};

/// Everything a connection handler needs, shared by all connections of
/// one server run.
pub struct ConnectionContext {
    pub config: Arc<ServerConfig>,
    pub bridge: EngineBridge,
    pub registry: Arc<SessionRegistry>,
    /// Upgraded sessions run here, outside the worker pool.
    pub sessions: TaskTracker,
    pub shutdown: CancellationToken,
}

/// Handle one accepted connection from start to close.
#[instrument(skip_all, fields(peer = %peer))]
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ConnectionContext>) {
    let mut reader = BufReader::new(stream);
    let read = tokio::time::timeout(
        ctx.config.read_timeout(),
        http::read_request(&mut reader, ctx.config.max_body_bytes),
    )
    .await;

    let request = match read {
        Err(_) => {
            debug!("timed out waiting for request");
            return;
        }
        Ok(Err(err)) => {
            match err.status() {
                Some(status) => {
                    warn!(status, error = %err, "rejecting request");
                    respond(&mut reader, &Response::status_error(status)).await;
                }
                None => debug!(error = %err, "connection closed without a request"),
            }
            close(reader).await;
            return;
        }
        Ok(Ok(request)) => request,
    };

    debug!(
        method = %request.method,
        path = %request.path,
        body_len = request.body.len(),
        "request received"
    );

    let response = match router::route(&request) {
        Route::Engine => {
            ctx.bridge.serve(reader.into_inner(), request.body).await;
            return;
        }
        Route::Upgrade => {
            start_session(reader, &request, &ctx).await;
            return;
        }
        Route::Preflight => Response::preflight(),
        Route::MethodNotAllowed => Response::status_error(405),
        Route::Health => match serde_json::to_string(&health::health_check(&ctx.config)) {
            Ok(body) => Response::json(200, body),
            Err(_) => Response::status_error(500),
        },
        Route::NotFound => Response::status_error(404),
    };

    respond(&mut reader, &response).await;
    close(reader).await;
}

async fn start_session(reader: BufReader<TcpStream>, request: &Request, ctx: &ConnectionContext) {
    let buffered = reader.buffer().to_vec();
    let stream = reader.into_inner();
    let socket = match upgrade::accept(stream, request, buffered).await {
        Ok(socket) => socket,
        Err(err) => {
            warn!(error = %err, "websocket handshake failed");
            return;
        }
    };
    record_status(101);

    let (client_id, outbound) = ctx.registry.register();
    drop(ctx.sessions.spawn(session::run_session(
        socket,
        client_id,
        outbound,
        Arc::clone(&ctx.registry),
        ctx.config.ping_interval(),
        ctx.shutdown.clone(),
    )));
}

async fn respond(reader: &mut BufReader<TcpStream>, response: &Response) {
    record_status(response.status);
    if let Err(err) = http::write_response(reader.get_mut(), response).await {
        warn!(status = response.status, error = %err, "failed to write response");
    }
}

async fn close(reader: BufReader<TcpStream>) {
    let mut stream = reader.into_inner();
    if let Err(err) = stream.shutdown().await {
        debug!(error = %err, "socket shutdown failed");
    }
}

pub(crate) fn record_status(status: u16) {
    counter!(HTTP_RESPONSES_TOTAL, "status" => status.to_string()).increment(1);
}
