//! # nal2-server
//!
//! Local HTTP + `WebSocket` server in front of a non-reentrant fitting engine.
//!
//! - Raw-socket HTTP/1.x: one request per connection, `Content-Length` bodies
//! - Bounded worker pool; surplus connections queue instead of being dropped
//! - Synchronous bridge from engine completions to socket responses, with a deadline
//! - `WebSocket` upgrade on the same port, `client_<n>` session registry
//! - Idempotent `start` / `stop` / `status` control plane

#![deny(unsafe_code)]

pub mod acceptor;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod net;
pub mod pool;
pub mod router;
pub mod server;
pub mod websocket;

pub use bridge::EngineBridge;
pub use config::ServerConfig;
pub use error::{BridgeError, HttpError, ServerError};
pub use server::{ControlFailure, Nal2Server, ServerStatus, StartReport, StopReport};
pub use websocket::{ClientId, InboundMessage, RegistryError, SessionEvent, SessionInfo, SessionRegistry};
