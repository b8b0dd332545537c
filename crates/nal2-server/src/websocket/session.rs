//! Per-session socket loop.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::registry::{ClientId, SessionRegistry};

/// Drive one session until the peer closes, the registry drops the
/// session, or `shutdown` fires. Always unregisters on exit.
pub async fn run_session<S>(
    socket: WebSocketStream<S>,
    client_id: ClientId,
    mut outbound: mpsc::Receiver<String>,
    registry: Arc<SessionRegistry>,
    ping_interval: Duration,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: queued frames plus periodic pings. Ends when the queue closes.
    let writer_cid = client_id.clone();
    let writer = async move {
        let mut ping = tokio::time::interval(ping_interval);
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    let Some(text) = msg else {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    };
                    if ws_tx.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    trace!(client_id = %writer_cid, "sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    };

    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    reader_registry.publish_message(&reader_cid, text.as_str().to_owned());
                }
                Ok(Message::Binary(data)) => {
                    debug!(client_id = %reader_cid, len = data.len(), "binary frame ignored");
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(err) => {
                    debug!(client_id = %reader_cid, error = %err, "websocket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        () = writer => debug!(client_id = %client_id, "session writer finished"),
        () = reader => debug!(client_id = %client_id, "session reader finished"),
        () = shutdown.cancelled() => debug!(client_id = %client_id, "session closed by shutdown"),
    }

    let _ = registry.unregister(&client_id);
}
