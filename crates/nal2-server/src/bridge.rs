//! Synchronous bridge between a connection and the engine.
//!
//! The engine reports through a [`Completion`] that may fire on any
//! thread, before or after the connection starts waiting. The connection
//! task parks on the matching receiver with a deadline; whichever happens
//! first (result, error, timeout) decides the response, and the socket is
//! closed here exactly once.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use nal2_core::{Completion, Engine, EngineResult};
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::http::{self, Response};
use crate::metrics::{ENGINE_CALLS_TOTAL, ENGINE_DURATION_SECONDS, ENGINE_ERRORS_TOTAL};

/// Read side of one engine call.
#[derive(Debug)]
pub struct PendingRequest {
    rx: oneshot::Receiver<EngineResult>,
    deadline: Instant,
    timeout: Duration,
}

impl PendingRequest {
    pub fn new(rx: oneshot::Receiver<EngineResult>, timeout: Duration) -> Self {
        Self {
            rx,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the first completion or the deadline.
    ///
    /// Consuming `self` drops the receiver, so a completion that arrives
    /// after a timeout is discarded by the sender side.
    pub async fn wait(self) -> Result<String, BridgeError> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(BridgeError::Engine(err)),
            Ok(Err(_)) => Err(BridgeError::Abandoned),
            Err(_) => Err(BridgeError::Timeout(self.timeout)),
        }
    }
}

/// Turns an [`Engine`] into a request/response call with a deadline.
#[derive(Clone)]
pub struct EngineBridge {
    engine: Arc<dyn Engine>,
    timeout: Duration,
}

impl EngineBridge {
    pub fn new(engine: Arc<dyn Engine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit `payload` and wait for its outcome.
    ///
    /// `invoke` runs on the blocking pool since the engine may do its work
    /// inline. The bridge adds no serialization of its own.
    pub async fn call(&self, payload: String) -> Result<String, BridgeError> {
        let (completion, rx) = Completion::channel();
        let pending = PendingRequest::new(rx, self.timeout);
        let engine = Arc::clone(&self.engine);
        let started = Instant::now();
        counter!(ENGINE_CALLS_TOTAL).increment(1);

        // Detached: the outcome arrives through the completion. A panic in
        // `invoke` drops the completion and surfaces as `Abandoned`.
        drop(tokio::task::spawn_blocking(move || {
            engine.invoke(payload, completion);
        }));

        let outcome = pending.wait().await;
        histogram!(ENGINE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        if let Err(err) = &outcome {
            counter!(ENGINE_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
        }
        outcome
    }

    /// Run one engine request for a connection and answer it.
    ///
    /// Owns `stream` so the socket outlives the request parse and is
    /// shut down here on every path.
    pub async fn serve<S>(&self, mut stream: S, body: String)
    where
        S: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let outcome = self.call(body).await;
        let elapsed_ms = started.elapsed().as_millis();
        match &outcome {
            Ok(_) => debug!(elapsed_ms, "engine request completed"),
            Err(err) => warn!(elapsed_ms, kind = err.kind(), error = %err, "engine request failed"),
        }

        let response = respond(&outcome);
        crate::connection::record_status(response.status);
        if let Err(err) = http::write_response(&mut stream, &response).await {
            warn!(error = %err, "failed to write engine response");
        }
        if let Err(err) = stream.shutdown().await {
            debug!(error = %err, "socket shutdown after engine response failed");
        }
    }
}

/// Map an engine outcome to its HTTP response.
///
/// Success bodies are passed through untouched. Failures become
/// `500 {"return": -1, "error": msg}`, or plain text if that JSON cannot
/// be produced.
pub fn respond(outcome: &Result<String, BridgeError>) -> Response {
    match outcome {
        Ok(body) => Response::json(200, body.clone()),
        Err(err) => {
            let message = err.to_string();
            match serde_json::to_string(&json!({ "return": -1, "error": message })) {
                Ok(body) => Response::json(500, body),
                Err(_) => Response::plain_text(500, format!("Internal Server Error: {message}")),
            }
        }
    }
}
