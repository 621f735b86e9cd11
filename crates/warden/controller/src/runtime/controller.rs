//! Event-driven controller loop
//!
//! Watch events are mapped to keys and fed into a [`WorkQueue`]; a pool of
//! workers drains it. A periodic relist catches anything the watch missed.

use super::queue::WorkQueue;
use crate::config::ControllerConfig;
use crate::error::{Action, ReconcileError, Result, RetryClass};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use warden_store::{ObjectStore, WatchEvent};
use warden_types::ObjectKey;

/// One kind of reconciler driven by the controller loop
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Every key this reconciler owns
    async fn list_keys(&self) -> Result<Vec<ObjectKey>>;

    /// Converge one key
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action>;

    /// Keys affected by a watch event
    async fn map_event(&self, event: &WatchEvent) -> Vec<ObjectKey>;
}

pub struct Controller<R: Reconcile> {
    reconciler: Arc<R>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<WorkQueue>,
    workers: usize,
    resync: Duration,
}

impl<R: Reconcile> Controller<R> {
    pub fn new(reconciler: R, store: Arc<dyn ObjectStore>, config: &ControllerConfig) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            store,
            queue: WorkQueue::new(config.backoff_base(), config.backoff_max()),
            workers: config.workers.max(1),
            resync: config.resync_interval(),
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    pub fn reconciler(&self) -> Arc<R> {
        Arc::clone(&self.reconciler)
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let name = self.reconciler.name();
        // Subscribe before the initial listing so nothing slips between them
        let events = self.store.watch();
        self.enqueue_all().await;

        info!(controller = name, workers = self.workers, "Controller started");

        let mut workers = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let reconciler = Arc::clone(&self.reconciler);
            let queue = Arc::clone(&self.queue);
            let shutdown = shutdown.clone();
            workers.push(tokio::spawn(worker(id, reconciler, queue, shutdown)));
        }

        self.pump(events, shutdown).await;

        self.queue.shutdown().await;
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!(controller = name, error = %e, "Worker panicked");
            }
        }
        info!(controller = name, "Controller stopped");
    }

    async fn enqueue_all(&self) {
        match self.reconciler.list_keys().await {
            Ok(keys) => {
                debug!(controller = self.reconciler.name(), count = keys.len(), "Relisted");
                for key in keys {
                    self.queue.add(key).await;
                }
            }
            Err(e) => warn!(controller = self.reconciler.name(), error = %e, "Relist failed"),
        }
    }

    async fn pump(
        &self,
        mut events: tokio::sync::broadcast::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut resync = interval(self.resync.max(Duration::from_secs(1)));
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial listing already ran
        resync.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = resync.tick() => self.enqueue_all().await,
                event = events.recv() => match event {
                    Ok(event) => {
                        for key in self.reconciler.map_event(&event).await {
                            self.queue.add(key).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            controller = self.reconciler.name(),
                            skipped,
                            "Watch lagged, relisting"
                        );
                        self.enqueue_all().await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}

async fn worker<R: Reconcile>(
    id: usize,
    reconciler: Arc<R>,
    queue: Arc<WorkQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let key = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            key = queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };

        let result = reconciler.reconcile(&key).await;
        handle_result(&queue, &key, result).await;
        queue.done(&key).await;
    }
    debug!(controller = reconciler.name(), worker = id, "Worker exiting");
}

async fn handle_result(queue: &Arc<WorkQueue>, key: &ObjectKey, result: Result<Action>) {
    match result {
        Ok(Action::AwaitChange) => queue.forget(key).await,
        Ok(Action::Requeue(delay)) => {
            queue.forget(key).await;
            queue.add_after(key.clone(), delay);
        }
        Err(err) => {
            let delay = requeue_after_error(queue, key, &err).await;
            debug!(%key, reason = err.reason(), ?delay, "Requeued after error");
        }
    }
}

async fn requeue_after_error(
    queue: &Arc<WorkQueue>,
    key: &ObjectKey,
    err: &ReconcileError,
) -> Duration {
    match err.retry_class() {
        RetryClass::Retryable | RetryClass::TerminalUntilFixed => {
            queue.add_rate_limited(key.clone()).await
        }
        // Needs a spec change; the resulting watch event requeues it sooner
        RetryClass::Fatal => {
            let delay = queue.max_backoff();
            queue.add_after(key.clone(), delay);
            delay
        }
    }
}
