//! Engine collaborator interface.
//!
//! The engine is invoked with an opaque payload and reports back exactly
//! once through a [`Completion`]. The completion may fire on any thread,
//! before or after the caller starts waiting, and any number of times:
//! only the first delivery is observed.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

/// Failure reported by the engine for a single invocation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected or failed the request.
    #[error("{0}")]
    Failed(String),
    /// The engine is no longer accepting work.
    #[error("engine stopped")]
    Stopped,
}

/// Outcome of one engine invocation.
pub type EngineResult = Result<String, EngineError>;

/// A non-reentrant fitting engine.
///
/// Implementations must complete every `completion` exactly once, either
/// inline or later from another thread. The caller never assumes the
/// engine is thread-safe; implementations that are not must serialize
/// their own work (see [`crate::SerialEngine`]).
pub trait Engine: Send + Sync + 'static {
    /// Submit `payload`; the result is delivered through `completion`.
    fn invoke(&self, payload: String, completion: Completion);
}

impl<F> Engine for F
where
    F: Fn(String, Completion) + Send + Sync + 'static,
{
    fn invoke(&self, payload: String, completion: Completion) {
        self(payload, completion);
    }
}

/// Write side of a pending engine request.
///
/// Cloning shares the same slot, so a duplicated callback still delivers
/// at most once.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Mutex<Option<oneshot::Sender<EngineResult>>>>,
}

impl Completion {
    /// Create a completion and the receiver its result is published to.
    pub fn channel() -> (Self, oneshot::Receiver<EngineResult>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (completion, rx)
    }

    /// Deliver a successful result.
    pub fn resolve(&self, value: impl Into<String>) -> bool {
        self.complete(Ok(value.into()))
    }

    /// Deliver a failure message.
    pub fn reject(&self, message: impl Into<String>) -> bool {
        self.complete(Err(EngineError::Failed(message.into())))
    }

    /// Deliver `outcome` if nothing has been delivered yet.
    ///
    /// Returns `true` only when the outcome reached a live waiter.
    pub fn complete(&self, outcome: EngineResult) -> bool {
        let mut slot = self.slot.lock();
        let Some(tx) = slot.take() else {
            debug!("duplicate engine completion discarded");
            return false;
        };
        if tx.send(outcome).is_err() {
            debug!("engine completion arrived after the waiter gave up");
            return false;
        }
        true
    }

    /// Whether an outcome has already been delivered (or discarded).
    pub fn is_completed(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn resolve_reaches_receiver() {
        let (completion, rx) = Completion::channel();
        assert!(completion.resolve("{\"ok\":true}"));
        assert_eq!(rx.await.unwrap().unwrap(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn reject_carries_message() {
        let (completion, rx) = Completion::channel();
        assert!(completion.reject("bad audiogram"));
        assert_matches!(rx.await.unwrap(), Err(EngineError::Failed(m)) if m == "bad audiogram");
    }

    #[tokio::test]
    async fn second_delivery_is_discarded() {
        let (completion, rx) = Completion::channel();
        let duplicate = completion.clone();
        assert!(completion.resolve("first"));
        assert!(!duplicate.resolve("second"));
        assert!(!duplicate.reject("third"));
        assert_eq!(rx.await.unwrap().unwrap(), "first");
    }

    #[test]
    fn delivery_after_receiver_dropped_returns_false() {
        let (completion, rx) = Completion::channel();
        drop(rx);
        assert!(!completion.resolve("late"));
        assert!(completion.is_completed());
    }

    #[tokio::test]
    async fn completion_from_another_thread() {
        let (completion, rx) = Completion::channel();
        let handle = std::thread::spawn(move || completion.resolve("from thread"));
        assert!(handle.join().unwrap());
        assert_eq!(rx.await.unwrap().unwrap(), "from thread");
    }

    #[tokio::test]
    async fn closure_engine_invokes_inline() {
        let engine = |payload: String, completion: Completion| {
            let _ = completion.resolve(payload.to_uppercase());
        };
        let (completion, rx) = Completion::channel();
        engine.invoke("abc".into(), completion);
        assert_eq!(rx.await.unwrap().unwrap(), "ABC");
    }

    #[test]
    fn error_display() {
        assert_eq!(EngineError::Failed("boom".into()).to_string(), "boom");
        assert_eq!(EngineError::Stopped.to_string(), "engine stopped");
    }
}
