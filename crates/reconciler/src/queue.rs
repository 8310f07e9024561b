//! Deduplicating, rate-limited work queue.
//!
//! Keys move through three sets:
//!
//! - `queue`: waiting to be handed out, in FIFO order
//! - `dirty`: need processing (every queued key, plus keys re-added while in
//!   flight)
//! - `processing`: handed out by [`WorkQueue::get`] and not yet marked
//!   [`WorkQueue::done`]
//!
//! A key is queued at most once, and never handed to two workers at the same
//! time. Adding a key that is in flight only marks it dirty; `done` then puts
//! it back in the queue.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

use crate::rate_limit::RateLimiter;

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            shutting_down: false,
        }
    }
}

enum Take<K> {
    Key(K),
    Wait,
    ShutDown,
}

/// Work queue shared by the event router (producer) and the workers
/// (consumers).
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<QueueState<K>>,
    available: Notify,
    limiter: Box<dyn RateLimiter<K>>,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    /// Create a queue that computes requeue delays with `limiter`.
    pub fn new(name: impl Into<String>, limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            limiter: Box::new(limiter),
        }
    }

    /// Shared handle to a new queue.
    pub fn new_arc(name: impl Into<String>, limiter: impl RateLimiter<K> + 'static) -> Arc<Self> {
        Arc::new(Self::new(name, limiter))
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark `key` as needing processing.
    ///
    /// No-op if the key is already waiting or the queue is shutting down. If
    /// the key is in flight it is redelivered after [`Self::done`].
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }

        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(queue = %self.name, ?key, "Key in flight, deferring");
            return;
        }

        state.queue.push_back(key);
        drop(state);
        self.available.notify_one();
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue is shut down, immediately for blocked and
    /// future callers alike. The caller owns the returned key until it calls
    /// [`Self::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_take() {
                Take::Key(key) => return Some(key),
                Take::ShutDown => return None,
                Take::Wait => notified.await,
            }
        }
    }

    fn try_take(&self) -> Take<K> {
        let mut state = self.lock();
        if state.shutting_down {
            return Take::ShutDown;
        }

        match state.queue.pop_front() {
            Some(key) => {
                state.dirty.remove(&key);
                state.processing.insert(key.clone());
                Take::Key(key)
            }
            None => Take::Wait,
        }
    }

    /// Finish processing `key`, requeueing it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.available.notify_one();
        }
    }

    /// Add `key` once `delay` has elapsed.
    ///
    /// The pending add is dropped if the queue shuts down or is itself dropped
    /// before the delay elapses.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = queue.upgrade() {
                queue.add(key);
            }
        });
    }

    /// Add `key` after the delay its rate limiter prescribes.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = self.limiter.when(&key);
        trace!(queue = %self.name, ?key, ?delay, "Requeueing with backoff");
        self.add_after(key, delay);
    }

    /// Clear the retry history of `key`.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    /// Rate-limited requeues of `key` since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys. Blocked and future [`Self::get`] calls return
    /// `None`; keys already handed out may still be marked done.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.available.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
