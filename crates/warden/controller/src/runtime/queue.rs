//! Deduplicating work queue
//!
//! Guarantees one in-flight reconcile per key: a key added while it is
//! being processed is marked dirty and handed out again once the current
//! pass is done. Failed keys back off exponentially until they succeed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::trace;
use warden_types::ObjectKey;

#[derive(Default)]
struct QueueState {
    ready: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    shut_down: bool,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl WorkQueue {
    pub fn new(backoff_base: Duration, backoff_max: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff_base,
            backoff_max,
        })
    }

    /// Queue a key now
    pub async fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            trace!(%key, "Queued");
            state.ready.push_back(key);
            self.notify.notify_one();
        }
    }

    /// Queue a key once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.add(key).await;
        });
    }

    /// Next backoff step for a failing key
    pub async fn backoff(&self, key: &ObjectKey) -> Duration {
        let mut state = self.state.lock().await;
        let failures = state.failures.entry(key.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        let exponent = (*failures - 1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }

    /// Backoff ceiling
    pub fn max_backoff(&self) -> Duration {
        self.backoff_max
    }

    /// Queue a failing key after its backoff delay
    pub async fn add_rate_limited(self: &Arc<Self>, key: ObjectKey) -> Duration {
        let delay = self.backoff(&key).await;
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of a key after a successful pass
    pub async fn forget(&self, key: &ObjectKey) {
        self.state.lock().await.failures.remove(key);
    }

    /// Wait for the next key; `None` once the queue is shut down
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                if let Some(key) = state.ready.pop_front() {
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

    /// Mark a key's pass as finished
    pub async fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shut_down && state.queued.insert(key.clone()) {
            state.ready.push_back(key.clone());
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiter
    pub async fn shutdown(&self) {
        self.state.lock().await.shut_down = true;
        self.notify.notify_waiters();
    }

    /// Keys waiting to be processed
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
