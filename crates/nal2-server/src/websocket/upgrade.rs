//! Server side of the WebSocket opening handshake.
//!
//! The request has already been parsed by the HTTP layer, so the
//! handshake answer is written by hand and the stream is handed to
//! `tokio-tungstenite` together with any bytes read past the headers.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use crate::http::{self, Request, Response};

/// `101 Switching Protocols` for `request`, or `None` if it carries no key.
pub fn handshake_response(request: &Request) -> Option<Response> {
    let key = request.header("sec-websocket-key")?;
    Some(
        Response::new(101)
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Accept", derive_accept_key(key.as_bytes())),
    )
}

/// Answer the handshake on `stream` and wrap it as a server-role socket.
///
/// `buffered` holds bytes the HTTP reader consumed past the request.
pub async fn accept<S>(
    mut stream: S,
    request: &Request,
    buffered: Vec<u8>,
) -> std::io::Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = handshake_response(request).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "missing Sec-WebSocket-Key")
    })?;
    http::write_response(&mut stream, &response).await?;
    Ok(WebSocketStream::from_partially_read(stream, buffered, Role::Server, None).await)
}
