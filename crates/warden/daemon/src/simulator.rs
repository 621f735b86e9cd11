//! Stand-in for a workload scheduler
//!
//! The local store has nothing that actually runs containers, so without
//! this every instance would stay `Pending`. The simulator watches workload
//! writes and reports the requested replicas as available.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use warden_store::{Api, ObjectStore, WatchEvent, WatchEventType};
use warden_types::{Kind, Workload};

pub struct WorkloadSimulator {
    store: Arc<dyn ObjectStore>,
    workloads: Api<Workload>,
}

impl WorkloadSimulator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            workloads: Api::new(store.clone()),
            store,
        }
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.store.watch();
        info!("Workload simulator started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Simulator lagged behind the watch");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("Workload simulator stopped");
    }

    async fn handle(&self, event: &WatchEvent) {
        if event.kind() != Kind::Workload || event.event_type == WatchEventType::Deleted {
            return;
        }
        let key = event.key();
        let result = self
            .workloads
            .patch_status(&key, |w| w.status.available_replicas = w.spec.replicas)
            .await;
        match result {
            Ok(Some(workload)) => {
                debug!(workload = %key, replicas = workload.status.available_replicas, "Workload available")
            }
            Ok(None) => {}
            Err(e) => warn!(workload = %key, error = %e, "Failed to update workload status"),
        }
    }
}
