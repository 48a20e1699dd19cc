//! Work queue of object keys.
//!
//! A key is queued at most once. While a worker holds a key, re-adding it only
//! marks it dirty; [`WorkQueue::done`] puts it back so the next pass sees the
//! newest state. This gives at most one in-flight pass per key.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cfp_core::ObjectKey;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    shut_down: bool,
}

impl QueueState {
    fn push(&mut self, key: ObjectKey) -> bool {
        if self.queued.insert(key.clone()) {
            self.pending.push_back(key);
            true
        } else {
            false
        }
    }
}

/// Deduplicating FIFO with per-key failure backoff.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl WorkQueue {
    /// Create a queue with the given failure backoff bounds.
    pub fn new(backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff_base,
            backoff_max,
        }
    }

    /// Create a shared queue.
    pub fn new_arc(backoff_base: Duration, backoff_max: Duration) -> Arc<Self> {
        Arc::new(Self::new(backoff_base, backoff_max))
    }

    /// Enqueue a key. Ignored after shutdown.
    pub async fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.push(key) {
            self.notify.notify_one();
        }
    }

    /// Enqueue a key after `delay`.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.add(key).await });
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Record a failure for `key` and enqueue it after its backoff.
    ///
    /// Returns the delay applied.
    pub async fn add_rate_limited(self: &Arc<Self>, key: ObjectKey) -> Duration {
        let failures = {
            let mut state = self.state.lock().await;
            let count = state.failures.entry(key.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        let delay = self.backoff(failures);
        debug!(object = %key, failures, delay_ms = delay.as_millis(), "Requeue with backoff");
        self.add_after(key, delay);
        delay
    }

    /// Backoff for the n-th consecutive failure.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 1_u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }

    /// Consecutive failures recorded for `key`.
    pub async fn failures(&self, key: &ObjectKey) -> u32 {
        self.state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Reset the failure counter for `key`.
    pub async fn forget(&self, key: &ObjectKey) {
        self.state.lock().await.failures.remove(key);
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(key) = state.pending.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shut_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release a key handed out by [`WorkQueue::get`].
    pub async fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shut_down && state.push(key.clone()) {
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shut_down(&self) {
        self.state.lock().await.shut_down = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Whether no key is waiting.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn queue() -> Arc<WorkQueue> {
        WorkQueue::new_arc(Duration::from_millis(10), Duration::from_millis(100))
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("ns", name)
    }

    #[tokio::test]
    async fn test_duplicate_adds_collapse() {
        let q = queue();
        q.add(key("a")).await;
        q.add(key("a")).await;
        q.add(key("b")).await;
        assert_eq!(q.len().await, 2);
        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.get().await, Some(key("b")));
    }

    #[tokio::test]
    async fn test_key_in_flight_is_redelivered_after_done() {
        let q = queue();
        q.add(key("a")).await;
        let held = q.get().await.unwrap();

        q.add(key("a")).await;
        assert!(q.is_empty().await, "in-flight key must not be handed out twice");

        q.done(&held).await;
        assert_eq!(q.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn test_done_without_readd_drops_key() {
        let q = queue();
        q.add(key("a")).await;
        let held = q.get().await.unwrap();
        q.done(&held).await;
        assert!(q.is_empty().await);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let q = WorkQueue::new(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(q.backoff(1), Duration::from_millis(10));
        assert_eq!(q.backoff(2), Duration::from_millis(20));
        assert_eq!(q.backoff(4), Duration::from_millis(80));
        assert_eq!(q.backoff(5), Duration::from_millis(100));
        assert_eq!(q.backoff(u32::MAX), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_add_waits_and_counts() {
        let q = queue();
        let first = q.add_rate_limited(key("a")).await;
        let second = q.add_rate_limited(key("a")).await;
        assert_eq!(first, Duration::from_millis(10));
        assert_eq!(second, Duration::from_millis(20));
        assert_eq!(q.failures(&key("a")).await, 2);

        let got = tokio::time::timeout(Duration::from_secs(1), q.get()).await;
        assert_eq!(got.unwrap(), Some(key("a")));

        q.forget(&key("a")).await;
        assert_eq!(q.failures(&key("a")).await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let q = queue();
        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.shut_down().await;

        let got = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert_eq!(got.unwrap().unwrap(), None);

        q.add(key("late")).await;
        assert!(q.is_empty().await);
    }
}
