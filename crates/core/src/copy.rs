//! Directory copy fan-out
//!
//! A directory rename copies every key below the source prefix. Each key is
//! one COPY task spawned onto the runtime. Two semaphores bound the fan-out:
//! the copy pool shared by all renames of a filesystem, and a per-rename
//! limit. Completion is tracked by a [`CopyBarrier`] owned by the rename.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::traits::ObjectStore;

/// Completion tracker for the copy tasks of one rename
#[derive(Debug, Default)]
pub struct CopyBarrier {
    finished: AtomicUsize,
    failed: AtomicBool,
    notify: Notify,
}

impl CopyBarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the completion of one task
    pub fn complete(&self, succeeded: bool) {
        if !succeeded {
            self.failed.store(true, Ordering::SeqCst);
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Flag a failure that did not come from a task
    pub fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Wait until `submitted` tasks have reported completion
    pub async fn wait(&self, submitted: usize) {
        // notify_one stores a permit when nobody waits, so a completion
        // between the check and the await is not lost.
        while self.finished() < submitted {
            self.notify.notified().await;
        }
    }
}

/// Copies of one directory rename, in flight on the copy pool
pub struct DirectoryCopy {
    store: Arc<dyn ObjectStore>,
    pool: Arc<Semaphore>,
    per_dir: Arc<Semaphore>,
    barrier: Arc<CopyBarrier>,
    submitted: usize,
}

impl DirectoryCopy {
    pub fn new(store: Arc<dyn ObjectStore>, pool: Arc<Semaphore>, per_dir_limit: usize) -> Self {
        Self {
            store,
            pool,
            per_dir: Arc::new(Semaphore::new(per_dir_limit.max(1))),
            barrier: CopyBarrier::new(),
            submitted: 0,
        }
    }

    pub fn has_failed(&self) -> bool {
        self.barrier.has_failed()
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Spawn a COPY of `src_key` to `dst_key`
    ///
    /// Waits while either limit is saturated. Returns `false` without
    /// submitting once any earlier copy has failed.
    pub async fn submit(&mut self, src_key: String, dst_key: String) -> bool {
        if self.has_failed() {
            return false;
        }
        let Some(permits) = self.acquire().await else {
            self.barrier.fail();
            return false;
        };
        // A failure may have been flagged while waiting for a slot.
        if self.has_failed() {
            return false;
        }

        self.submitted += 1;
        let store = Arc::clone(&self.store);
        let barrier = Arc::clone(&self.barrier);
        tokio::spawn(async move {
            let _permits = permits;
            let result = store.copy_object(&src_key, &dst_key).await;
            if let Err(e) = &result {
                warn!(src = %src_key, dst = %dst_key, error = %e, "Copy failed");
            } else {
                debug!(src = %src_key, dst = %dst_key, "Copied");
            }
            barrier.complete(result.is_ok());
        });
        true
    }

    async fn acquire(&self) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
        let dir_permit = Arc::clone(&self.per_dir).acquire_owned().await.ok()?;
        let pool_permit = Arc::clone(&self.pool).acquire_owned().await.ok()?;
        Some((dir_permit, pool_permit))
    }

    /// Wait for every submitted copy; `true` if none failed
    pub async fn finish(self) -> bool {
        let guard = PendingCopies {
            barrier: Arc::clone(&self.barrier),
            submitted: self.submitted,
            done: false,
        };
        self.barrier.wait(self.submitted).await;
        guard.disarm();
        !self.barrier.has_failed()
    }
}

/// Logs when the wait for copies is cancelled; the tasks keep running
struct PendingCopies {
    barrier: Arc<CopyBarrier>,
    submitted: usize,
    done: bool,
}

impl PendingCopies {
    fn disarm(mut self) {
        self.done = true;
    }
}

impl Drop for PendingCopies {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                submitted = self.submitted,
                finished = self.barrier.finished(),
                "Wait for directory copy cancelled, remaining copies continue detached"
            );
        }
    }
}
