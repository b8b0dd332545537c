//! Single dispatch queue for a blocking, non-reentrant backend.
//!
//! `SerialEngine` owns one OS thread that pulls jobs off an unbounded
//! queue and runs them one at a time, so backend state (profile setters,
//! calibration tables) is never touched concurrently.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{Completion, Engine, EngineError};

/// A synchronous fitting backend driven by [`SerialEngine`].
pub trait FittingBackend: Send + 'static {
    /// Process one request payload. `Err` carries a user-facing message.
    fn process(&mut self, payload: &str) -> Result<String, String>;
}

struct Job {
    payload: String,
    completion: Completion,
}

/// Engine adapter that serializes every invocation onto one thread.
pub struct SerialEngine {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
}

impl SerialEngine {
    /// Start the dispatch thread for `backend`.
    pub fn spawn<B: FittingBackend>(backend: B) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let processed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&processed);
        let worker = std::thread::Builder::new()
            .name("nal2-engine".into())
            .spawn(move || run_queue(backend, rx, &counter))?;
        info!("engine dispatch thread started");
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            processed,
        })
    }

    /// Number of jobs the dispatch thread has finished.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Close the queue, let queued jobs finish, and join the thread.
    ///
    /// Later invocations are rejected with [`EngineError::Stopped`].
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("engine dispatch thread exited abnormally");
            }
        }
    }
}

impl Engine for SerialEngine {
    fn invoke(&self, payload: String, completion: Completion) {
        let job = Job {
            payload,
            completion,
        };
        let rejected = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(job).err().map(|e| e.0),
            None => Some(job),
        };
        if let Some(job) = rejected {
            let _ = job.completion.complete(Err(EngineError::Stopped));
        }
    }
}

impl Drop for SerialEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_queue<B: FittingBackend>(
    mut backend: B,
    mut rx: mpsc::UnboundedReceiver<Job>,
    processed: &AtomicU64,
) {
    while let Some(job) = rx.blocking_recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.process(&job.payload)));
        let delivered = match outcome {
            Ok(Ok(output)) => job.completion.resolve(output),
            Ok(Err(message)) => job.completion.reject(message),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "fitting backend panicked");
                job.completion.reject(format!("engine panicked: {message}"))
            }
        };
        let _ = processed.fetch_add(1, Ordering::Relaxed);
        if !delivered {
            debug!("engine result had no waiter");
        }
    }
    info!("engine dispatch thread stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
