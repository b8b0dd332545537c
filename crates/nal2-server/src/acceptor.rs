//! Listening socket and accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{handle_connection, ConnectionContext};
use crate::error::ServerError;
use crate::metrics::{ACCEPT_ERRORS_TOTAL, CONNECTIONS_ACCEPTED_TOTAL};
use crate::pool::WorkerPool;

const BACKLOG: u32 = 1024;

/// Pause after a transient accept failure so a full fd table can drain.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Bind a listener on `addr` with address reuse enabled.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let to_bind_error = |source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(to_bind_error)?;
    socket.set_reuseaddr(true).map_err(to_bind_error)?;
    socket.bind(addr).map_err(to_bind_error)?;
    socket.listen(BACKLOG).map_err(to_bind_error)
}

/// Accept connections until `token` fires or the listener fails for good.
///
/// Each connection becomes one job on `pool`. Dropping the listener on
/// return closes the port.
pub async fn run_acceptor(
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    ctx: Arc<ConnectionContext>,
    token: CancellationToken,
) {
    let local = listener
        .local_addr()
        .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
    info!(addr = %local, "acceptor running");

    loop {
        let accepted = tokio::select! {
            biased;
            () = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                counter!(CONNECTIONS_ACCEPTED_TOTAL).increment(1);
                debug!(peer = %peer, "connection accepted");
                if !pool.submit(handle_connection(stream, peer, Arc::clone(&ctx))) {
                    debug!(peer = %peer, "pool closed, dropping connection");
                }
            }
            Err(err) if is_transient(&err) => {
                counter!(ACCEPT_ERRORS_TOTAL).increment(1);
                warn!(error = %err, "accept failed, retrying");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
            Err(err) => {
                counter!(ACCEPT_ERRORS_TOTAL).increment(1);
                error!(error = %err, "accept loop stopped on unrecoverable error");
                break;
            }
        }
    }

    info!(addr = %local, "acceptor stopped");
}

/// Errors after which accepting again can succeed.
fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::{
        ConnectionAborted, ConnectionRefused, ConnectionReset, Interrupted, TimedOut, WouldBlock,
    };
    matches!(
        err.kind(),
        ConnectionAborted | ConnectionRefused | ConnectionReset | Interrupted | TimedOut | WouldBlock
    ) || matches!(err.raw_os_error(), Some(23 | 24)) // ENFILE, EMFILE
}
