//! Minimal HTTP/1.x request reader and response writer.
//!
//! One request per connection: a request line, header lines up to a blank
//! line, then exactly `Content-Length` body bytes. Only `Content-Length`
//! (and the WebSocket upgrade headers) carry meaning; everything else is
//! kept for logging. No chunked encoding, no keep-alive.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HttpError;

/// Longest request or header line accepted, in bytes.
pub const MAX_LINE_BYTES: u64 = 8 * 1024;
/// Most header lines accepted before the request is rejected.
pub const MAX_HEADERS: usize = 100;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A parsed request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `GET` with `Upgrade: websocket` and a `Sec-WebSocket-Key`.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method == "GET"
            && self
                .header("upgrade")
                .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"))
            && self.header("sec-websocket-key").is_some()
    }
}

/// Read one request from `reader`.
///
/// Returns [`HttpError::Closed`] if the stream ends before a request line.
/// The body is read with `read_exact`, so TCP segmentation never shortens it.
pub async fn read_request<R>(reader: &mut R, max_body: usize) -> Result<Request, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = match read_line(reader).await? {
        Some(line) if !line.is_empty() => line,
        _ => return Err(HttpError::Closed),
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Err(HttpError::MalformedRequestLine(request_line));
    };
    let version = parts.next().unwrap_or("HTTP/1.0").to_string();
    let (method, path) = (method.to_string(), path.to_string());

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    while let Some(line) = read_line(reader).await? {
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(HttpError::TooManyHeaders { limit: MAX_HEADERS });
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| HttpError::InvalidContentLength(value.to_string()))?;
        }
        headers.push((name.to_string(), value.to_string()));
    }

    if content_length > max_body {
        return Err(HttpError::BodyTooLarge {
            length: content_length,
            limit: max_body,
        });
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        let _ = reader.read_exact(&mut body).await?;
    }
    let body = String::from_utf8(body)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

    Ok(Request {
        method,
        path,
        version,
        headers,
        body,
    })
}

/// Read a CRLF/LF terminated line without its terminator.
///
/// `Ok(None)` means EOF before any byte.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES)
        .read_until(b'\n', &mut raw)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if raw.last() != Some(&b'\n') && n as u64 >= MAX_LINE_BYTES {
        return Err(HttpError::LineTooLong);
    }
    while matches!(raw.last(), Some(b'\n' | b'\r')) {
        let _ = raw.pop();
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// An outgoing response.
///
/// `Content-Length` and `Access-Control-Allow-Origin` are added when
/// encoding and must not be set by callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON response carrying `body` verbatim, closing the connection.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", JSON_CONTENT_TYPE)
            .with_header("Connection", "close")
            .with_body(body.into())
    }

    /// JSON response from a value.
    pub fn json_value(status: u16, value: &Value) -> Self {
        Self::json(status, value.to_string())
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json_value(status, &json!({ "error": message }))
    }

    /// Error response whose message is the status's reason phrase.
    pub fn status_error(status: u16) -> Self {
        Self::error(status, reason_phrase(status))
    }

    /// Plain-text response, used when a JSON body cannot be built.
    pub fn plain_text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_header("Connection", "close")
            .with_body(text.into())
    }

    /// CORS preflight answer: `200`, empty body, no content type.
    pub fn preflight() -> Self {
        Self::new(200)
            .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .with_header("Access-Control-Allow-Headers", "Content-Type")
    }

    /// Encode status line, headers, and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("Access-Control-Allow-Origin: *\r\n");
        // 1xx responses carry no body and no length.
        if self.status >= 200 {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Write `response` and flush.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await
}

/// Canonical reason phrase for the statuses this server emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
