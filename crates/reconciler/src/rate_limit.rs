//! Requeue delay policies.
//!
//! A [`RateLimiter`] answers "how long should this key wait before it is
//! processed again" and keeps whatever per-key history it needs to answer.
//! The controller default combines a per-key exponential backoff with an
//! overall token bucket and takes the larger delay.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Per-key requeue delay policy.
pub trait RateLimiter<K>: Send + Sync {
    /// Delay before `key` may be processed again. Counts as one requeue.
    fn when(&self, key: &K) -> Duration;

    /// Drop the history of `key`.
    fn forget(&self, key: &K);

    /// Number of requeues of `key` since it was last forgotten.
    fn num_requeues(&self, key: &K) -> u32;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ExponentialFailureRateLimiter<K> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K> ExponentialFailureRateLimiter<K> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl<K> RateLimiter<K> for ExponentialFailureRateLimiter<K>
where
    K: Clone + Eq + Hash + Send,
{
    fn when(&self, key: &K) -> Duration {
        let failures = {
            let mut history = lock(&self.failures);
            let count = history.entry(key.clone()).or_insert(0);
            let previous = *count;
            *count = previous.saturating_add(1);
            previous
        };
        self.backoff(failures)
    }

    fn forget(&self, key: &K) {
        lock(&self.failures).remove(key);
    }

    fn num_requeues(&self, key: &K) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Token bucket shared by every key: `qps` sustained, `burst` at once.
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    /// Create a full bucket. `qps` must be positive.
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    fn reserve(&self) -> Duration {
        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.qps, bucket.tokens).min(self.burst) - 1.0;
        bucket.last = now;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }
}

impl<K> RateLimiter<K> for BucketRateLimiter {
    fn when(&self, _key: &K) -> Duration {
        self.reserve()
    }

    fn forget(&self, _key: &K) {}

    fn num_requeues(&self, _key: &K) -> u32 {
        0
    }
}

/// Largest delay of several limiters.
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Box<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    pub fn new(limiters: Vec<Box<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&self, key: &K) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &K) {
        self.limiters.iter().for_each(|limiter| limiter.forget(key));
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Exponential per-key backoff combined with an overall token bucket.
pub fn default_controller_rate_limiter<K>(config: &RateLimitConfig) -> MaxOfRateLimiter<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ExponentialFailureRateLimiter::new(
            config.base_delay(),
            config.max_delay(),
        )),
        Box::new(BucketRateLimiter::new(config.qps, config.burst)),
    ])
}
