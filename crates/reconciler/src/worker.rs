//! Worker pool draining the work queue.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::queue::WorkQueue;
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// What happened to a key after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDisposition {
    /// Reconciled; retry history cleared.
    Done,
    /// Failed and scheduled for a rate-limited retry.
    Requeued,
    /// Failed for good; retry history cleared.
    Dropped,
}

/// One execution unit: dequeue, reconcile, settle the key.
pub struct Worker {
    id: usize,
    queue: Arc<WorkQueue<String>>,
    reconciler: Arc<Reconciler>,
    max_retries: u32,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<WorkQueue<String>>,
        reconciler: Arc<Reconciler>,
        max_retries: u32,
    ) -> Self {
        Self {
            id,
            queue,
            reconciler,
            max_retries,
        }
    }

    /// Process keys until the queue shuts down.
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");
        while self.process_next_item().await.is_some() {}
        debug!(worker = self.id, "Worker stopped");
    }

    /// Take one key and reconcile it. Returns `None` once the queue is shut
    /// down.
    pub async fn process_next_item(&self) -> Option<ItemDisposition> {
        let key = self.queue.get().await?;
        let result = self.reconciler.reconcile(&key).await;
        let disposition = self.settle(&key, result);
        self.queue.done(&key);
        Some(disposition)
    }

    fn settle(&self, key: &String, result: Result<ReconcileOutcome>) -> ItemDisposition {
        let error = match result {
            Ok(_) => {
                self.queue.forget(key);
                return ItemDisposition::Done;
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            self.queue.forget(key);
            error!(worker = self.id, key = %key, error = %error, "Dropping key");
            return ItemDisposition::Dropped;
        }

        let requeues = self.queue.num_requeues(key);
        if requeues < self.max_retries {
            warn!(
                worker = self.id,
                key = %key,
                error = %error,
                requeues,
                "Error syncing, requeuing"
            );
            self.queue.add_rate_limited(key.clone());
            ItemDisposition::Requeued
        } else {
            self.queue.forget(key);
            error!(
                worker = self.id,
                key = %key,
                error = %error,
                retries = requeues,
                "Dropping key after exhausting retries"
            );
            ItemDisposition::Dropped
        }
    }
}

/// Fixed set of workers sharing one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers.
    pub fn spawn(
        count: usize,
        queue: &Arc<WorkQueue<String>>,
        reconciler: &Arc<Reconciler>,
        max_retries: u32,
    ) -> Self {
        let handles = (0..count)
            .map(|id| {
                let worker =
                    Worker::new(id, Arc::clone(queue), Arc::clone(reconciler), max_retries);
                tokio::spawn(worker.run())
            })
            .collect();
        info!(workers = count, "Started workers");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Workers exit once the queue is shut down
    /// and their current item is finished.
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}
