//! Bounded worker pool for connection handlers.
//!
//! Every submitted job gets its own task, but only `size` of them run at
//! once: the rest wait on a FIFO semaphore. A job that panics is contained
//! and its permit returned. Shutdown closes the pool to new work, drops
//! queued jobs, and gives running jobs a grace period before aborting them.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, gauge};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::metrics::{CONNECTIONS_ACTIVE, CONNECTIONS_QUEUED, WORKER_PANICS_TOTAL};

pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Cancelled when the pool stops admitting work.
    closing: CancellationToken,
    /// Cancelled when running jobs must be abandoned.
    abort: CancellationToken,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// A pool running at most `size` jobs at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            closing: CancellationToken::new(),
            abort: CancellationToken::new(),
            queued: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Jobs waiting for a free slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Queue `job`. Never blocks; returns `false` once the pool is shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return false;
        }

        let permits = Arc::clone(&self.permits);
        let closing = self.closing.clone();
        let abort = self.abort.clone();
        let queued = Arc::clone(&self.queued);
        let active = Arc::clone(&self.active);

        let _ = queued.fetch_add(1, Ordering::Relaxed);
        gauge!(CONNECTIONS_QUEUED).increment(1.0);

        drop(self.tracker.spawn(async move {
            let permit = tokio::select! {
                permit = permits.acquire_owned() => permit.ok(),
                () = closing.cancelled() => None,
            };
            let _ = queued.fetch_sub(1, Ordering::Relaxed);
            gauge!(CONNECTIONS_QUEUED).decrement(1.0);
            let Some(permit) = permit else {
                debug!("queued connection dropped by shutdown");
                return;
            };

            let _ = active.fetch_add(1, Ordering::Relaxed);
            gauge!(CONNECTIONS_ACTIVE).increment(1.0);

            tokio::select! {
                outcome = AssertUnwindSafe(job).catch_unwind() => {
                    if let Err(panic) = outcome {
                        counter!(WORKER_PANICS_TOTAL).increment(1);
                        warn!(message = %panic_message(panic.as_ref()), "connection handler panicked");
                    }
                }
                () = abort.cancelled() => debug!("connection aborted by shutdown"),
            }

            let _ = active.fetch_sub(1, Ordering::Relaxed);
            gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
            drop(permit);
        }));
        true
    }

    /// Stop admitting work, drop queued jobs, and wait up to `grace` for
    /// running ones before aborting them. Safe to call more than once.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self.tracker.close();
        self.closing.cancel();
        info!(
            running = self.active(),
            grace_secs = grace.as_secs(),
            "draining worker pool"
        );

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                running = self.active(),
                "worker pool grace period elapsed, aborting connections"
            );
            self.abort.cancel();
            self.tracker.wait().await;
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::{mpsc, oneshot};

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = WorkerPool::new(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..5 {
            let tx = tx.clone();
            assert!(pool.submit(async move {
                let _ = tx.send(i);
            }));
        }
        drop(tx);
        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn never_exceeds_size() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for _ in 0..12 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done_tx = done_tx.clone();
            let _ = pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = running.fetch_sub(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            });
        }
        for _ in 0..12 {
            done_rx.recv().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn panic_releases_slot() {
        let pool = WorkerPool::new(1);
        assert!(pool.submit(async { panic!("handler bug") }));
        let (tx, rx) = oneshot::channel();
        assert!(pool.submit(async move {
            let _ = tx.send("ran");
        }));
        assert_eq!(rx.await.unwrap(), "ran");
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_refused() {
        let pool = WorkerPool::new(1);
        pool.shutdown(Duration::from_millis(10)).await;
        assert!(pool.is_closed());
        assert!(!pool.submit(async {}));
        pool.shutdown(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_queued_jobs() {
        let pool = WorkerPool::new(1);
        let _ = pool.submit(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let _ = pool.submit(async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;
        assert_eq!(pool.active(), 1);
        assert_eq!(pool.queued(), 1);

        pool.shutdown(Duration::from_secs(1)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_after_grace() {
        let pool = WorkerPool::new(1);
        let _ = pool.submit(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        tokio::task::yield_now().await;
        assert_eq!(pool.active(), 1);

        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(pool.active(), 0);
    }
}
