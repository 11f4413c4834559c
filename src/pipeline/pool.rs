//! Bounded pool for blocking stage+execute jobs.
//!
//! Jobs run on tokio's blocking threads; a semaphore caps how many run at once.
//! The awaiting future is bounded, and if it gives up (timeout or cancellation)
//! the process tree the job is waiting on is killed.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::util::ProcessTracker;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("job did not finish within {0:?}")]
    Timeout(Duration),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("execution pool is shut down")]
    Closed,
}

/// Kills the tracked process tree unless disarmed, covering a dropped awaiting future.
struct KillOnDrop {
    tracker: ProcessTracker,
    armed: bool,
}

impl KillOnDrop {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if self.armed && self.tracker.kill() {
            warn!("Execution cancelled, killed running toolchain process");
        }
    }
}

pub struct ExecutionPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl ExecutionPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Workers not currently running a job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a worker is free.
    ///
    /// `bound` limits how long the caller waits once the job has started. The job
    /// receives a [`ProcessTracker`] it should hand to the process runner so that
    /// giving up also kills what it spawned.
    pub async fn dispatch<F, T>(&self, bound: Option<Duration>, job: F) -> Result<T, PoolError>
    where
        F: FnOnce(ProcessTracker) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let tracker = ProcessTracker::new();
        let mut guard = KillOnDrop {
            tracker: tracker.clone(),
            armed: true,
        };

        let job_tracker = tracker.clone();
        let handle = tokio::task::spawn_blocking(move || {
            // The worker slot stays taken until the job really ends.
            let _permit = permit;
            job(job_tracker)
        });

        let joined = match bound {
            Some(bound) => match tokio::time::timeout(bound, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Job exceeded {:?}, killing its process tree", bound);
                    tracker.kill();
                    guard.disarm();
                    return Err(PoolError::Timeout(bound));
                }
            },
            None => handle.await,
        };
        guard.disarm();

        joined.map_err(|e| {
            if e.is_panic() {
                let message = panic_message(e.into_panic());
                debug!("Job panicked: {}", message);
                PoolError::Panicked(message)
            } else {
                PoolError::Closed
            }
        })
    }

    /// Stop handing out workers; pending and future dispatches fail with [`PoolError::Closed`].
    pub fn close(&self) {
        self.permits.close();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_dispatch_returns_job_result() {
        let pool = ExecutionPool::new(2);
        let value = pool.dispatch(None, |_| 40 + 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_zero_workers_means_one() {
        let pool = ExecutionPool::new(0);
        assert_eq!(pool.max_workers(), 1);
        assert_eq!(pool.dispatch(None, |_| "ok").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_bound_exceeded_is_timeout() {
        let pool = ExecutionPool::new(1);
        let result = pool
            .dispatch(Some(Duration::from_millis(100)), |_| {
                std::thread::sleep(Duration::from_millis(1500));
            })
            .await;
        assert!(matches!(result, Err(PoolError::Timeout(d)) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported() {
        let pool = ExecutionPool::new(1);
        let result: Result<(), _> = pool
            .dispatch(None, |_| panic!("staging exploded"))
            .await;
        match result {
            Err(PoolError::Panicked(message)) => assert!(message.contains("staging exploded")),
            other => panic!("expected panic error, got {other:?}"),
        }
        // The worker slot is released after a panic.
        assert_eq!(pool.dispatch(None, |_| 1).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_capped() {
        let pool = Arc::new(ExecutionPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.dispatch(None, move |_| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(100));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_jobs() {
        let pool = ExecutionPool::new(1);
        pool.close();
        assert!(matches!(pool.dispatch(None, |_| ()).await, Err(PoolError::Closed)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_dispatch_kills_process() {
        use crate::util::run_cmd_with_timeout;
        use std::process::Command;
        use std::sync::mpsc;

        let pool = ExecutionPool::new(1);
        let (sender, receiver) = mpsc::channel();
        let dispatch = pool.dispatch(None, move |tracker| {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg("sleep 30");
            let result = run_cmd_with_timeout(cmd, Duration::from_secs(60), &tracker);
            let _ = sender.send(result.map(|o| o.success()));
        });

        // Dropping the dispatch future after it started must kill `sleep`.
        let cancelled = tokio::time::timeout(Duration::from_millis(500), dispatch).await;
        assert!(cancelled.is_err());

        let finished = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(!finished.unwrap());
    }
}
