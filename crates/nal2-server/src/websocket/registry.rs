//! Registry of open WebSocket sessions.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use thiserror::Error;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::metrics::{
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_SEND_FAILURES_TOTAL, WS_SESSIONS_ACTIVE,
};

/// Capacity of the upward event channel.
pub const EVENT_CAPACITY: usize = 1024;

/// Identifier of one session: `client_<n>`, never reused by a registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Notification published for the embedding application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Connected { client_id: ClientId },
    #[serde(rename_all = "camelCase")]
    Disconnected { client_id: ClientId },
    #[serde(rename_all = "camelCase")]
    Message { client_id: ClientId, text: String },
}

impl SessionEvent {
    pub fn client_id(&self) -> &ClientId {
        match self {
            Self::Connected { client_id }
            | Self::Disconnected { client_id }
            | Self::Message { client_id, .. } => client_id,
        }
    }
}

/// A text frame handed to the inbox consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub client_id: ClientId,
    pub text: String,
}

/// Failure to queue a frame for a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no open session with id {0}")]
    NotFound(ClientId),
    #[error("send queue for {0} is full")]
    Backpressure(ClientId),
}

/// Snapshot of one session for status reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub client_id: ClientId,
    pub connected_at: DateTime<Utc>,
}

struct Session {
    tx: mpsc::Sender<String>,
    connected_at: DateTime<Utc>,
}

/// Open sessions keyed by [`ClientId`].
///
/// The registry only holds each session's outbound queue; the socket
/// itself belongs to the session task. Removing an entry drops the queue,
/// which makes the session task close the socket.
pub struct SessionRegistry {
    sessions: DashMap<ClientId, Session>,
    next_id: AtomicU64,
    queue_capacity: usize,
    events: broadcast::Sender<SessionEvent>,
    /// Lossless copy of every message for the one consumer that answers them.
    inbox: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
}

impl SessionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(0),
            queue_capacity: queue_capacity.max(1),
            events,
            inbox: Mutex::new(None),
        }
    }

    /// Subscribe to connect, disconnect, and message events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Take over the message inbox.
    ///
    /// Unlike [`subscribe`](Self::subscribe), the inbox never lags: every
    /// message published after this call is queued until received. A second
    /// call replaces the previous consumer, whose stream then ends.
    pub fn open_inbox(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbox.lock() = Some(tx);
        rx
    }

    /// Open a session: mint its id, store its queue, announce it.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = ClientId(format!("client_{n}"));
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let _ = self.sessions.insert(
            id.clone(),
            Session {
                tx,
                connected_at: Utc::now(),
            },
        );
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_SESSIONS_ACTIVE).increment(1.0);
        info!(client_id = %id, "websocket client connected");
        self.emit(SessionEvent::Connected { client_id: id.clone() });
        (id, rx)
    }

    /// Close a session. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: &ClientId) -> bool {
        if self.sessions.remove(id).is_none() {
            return false;
        }
        self.on_removed(id.clone());
        true
    }

    /// Publish a text frame received from `id`.
    pub fn publish_message(&self, id: &ClientId, text: String) {
        debug!(client_id = %id, len = text.len(), "websocket message received");
        {
            let mut inbox = self.inbox.lock();
            if let Some(tx) = inbox.as_ref() {
                let message = InboundMessage {
                    client_id: id.clone(),
                    text: text.clone(),
                };
                if tx.send(message).is_err() {
                    *inbox = None;
                }
            }
        }
        self.emit(SessionEvent::Message {
            client_id: id.clone(),
            text,
        });
    }

    /// Queue `text` for one session.
    pub fn send(&self, id: &ClientId, text: impl Into<String>) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        match session.tx.try_send(text.into()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                counter!(WS_SEND_FAILURES_TOTAL).increment(1);
                warn!(client_id = %id, msg_len = msg.len(), "send queue full, dropping message");
                Err(RegistryError::Backpressure(id.clone()))
            }
            // The session task has exited and is about to unregister.
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RegistryError::NotFound(id.clone())),
        }
    }

    /// Queue `text` for every open session. Returns how many accepted it.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;
        for entry in self.sessions.iter() {
            if entry.value().tx.try_send(text.to_string()).is_ok() {
                delivered += 1;
            } else {
                counter!(WS_SEND_FAILURES_TOTAL).increment(1);
                warn!(client_id = %entry.key(), "failed to queue broadcast");
            }
        }
        debug!(recipients = delivered, total = self.sessions.len(), "broadcast");
        delivered
    }

    /// Drop every session, announcing each disconnect. Returns the count.
    pub fn clear(&self) -> usize {
        let ids: Vec<ClientId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.unregister(id)).count()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Open sessions ordered by id number.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|e| SessionInfo {
                client_id: e.key().clone(),
                connected_at: e.value().connected_at,
            })
            .collect();
        list.sort_by_key(|s| {
            s.client_id
                .as_str()
                .trim_start_matches("client_")
                .parse::<u64>()
                .unwrap_or(u64::MAX)
        });
        list
    }

    fn on_removed(&self, id: ClientId) {
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
        info!(client_id = %id, "websocket client disconnected");
        self.emit(SessionEvent::Disconnected { client_id: id });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
