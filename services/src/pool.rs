//! Bounded worker pool for per-repo jobs.
//!
//! The refresh daemon submits one job per repo; the pool caps how many run
//! at once. Oversubscription is rejected instead of queued, which keeps
//! backpressure visible at the registry level.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Convenient result alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors raised when submitting work to the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// All worker slots are busy; the caller should retry next pass.
    #[error("worker pool is full ({capacity} slots busy)")]
    Full { capacity: usize },
}

/// Fixed-size pool of concurrent tasks.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Creates a pool with `capacity` concurrent slots (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Spawns `fut` if a slot is free, rejecting with [`PoolError::Full`]
    /// otherwise. The slot is held until the task finishes, on every exit
    /// path.
    pub fn try_submit<F, T>(&self, fut: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit: OwnedSemaphorePermit = match self.slots.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                return Err(PoolError::Full {
                    capacity: self.capacity,
                });
            }
        };

        Ok(tokio::spawn(async move {
            let _slot = permit;
            fut.await
        }))
    }

    /// Number of currently free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn rejects_oversubscription() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = pool
            .try_submit(async move {
                let _ = rx.await;
            })
            .unwrap();

        assert!(matches!(
            pool.try_submit(async {}),
            Err(PoolError::Full { capacity: 1 })
        ));

        tx.send(()).unwrap();
        handle.await.unwrap();

        // Slot is free again after completion.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.available(), 1);
    }
}
