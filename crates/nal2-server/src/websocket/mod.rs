//! WebSocket sessions: the id registry with send and broadcast, the
//! per-session socket loop, and the upgrade handshake.

pub mod registry;
pub mod session;
pub mod upgrade;

pub use registry::{ClientId, InboundMessage, RegistryError, SessionEvent, SessionInfo, SessionRegistry};
