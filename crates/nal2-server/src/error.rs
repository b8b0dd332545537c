//! Error types for the server.

use std::time::Duration;

use nal2_core::EngineError;
use thiserror::Error;

/// Failures of the control plane.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created or bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The configured host is not an IP address.
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),
}

/// Failures while reading a request off a socket.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer closed (or sent nothing) before a request line arrived.
    #[error("connection closed before a request was received")]
    Closed,
    /// The request line had fewer than two tokens.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
    /// A request or header line exceeded the line limit.
    #[error("request line or header too long")]
    LineTooLong,
    /// More header lines than the parser accepts.
    #[error("too many header lines (limit {limit})")]
    TooManyHeaders { limit: usize },
    /// `Content-Length` was not a non-negative integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
    /// `Content-Length` exceeded the configured limit.
    #[error("body of {length} bytes exceeds limit of {limit}")]
    BodyTooLarge { length: usize, limit: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Status to answer with, or `None` when the connection should just
    /// be closed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::MalformedRequestLine(_)
            | Self::LineTooLong
            | Self::TooManyHeaders { .. }
            | Self::InvalidContentLength(_) => Some(400),
            Self::BodyTooLarge { .. } => Some(413),
            Self::Closed | Self::Io(_) => None,
        }
    }
}

/// Outcome of waiting on the engine that is not a result.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine completed with an error.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// No completion arrived before the deadline.
    #[error("engine did not respond within {}s", .0.as_secs())]
    Timeout(Duration),
    /// The engine dropped the request without completing it.
    #[error("engine dropped the request without a result")]
    Abandoned,
}

impl BridgeError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(_) => "engine",
            Self::Timeout(_) => "timeout",
            Self::Abandoned => "abandoned",
        }
    }
}
