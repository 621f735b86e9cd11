//! Daemon lifecycle: wiring, start-up and graceful shutdown

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::seed::SeedFile;
use crate::simulator::WorkloadSimulator;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_controller::{
    Controller, EventRecorder, InstanceReconciler, McpServerReconciler, PersonalityReconciler,
};
use warden_store::{InMemoryStore, ObjectStore};
use warden_template::{ArtifactCache, DirectoryTransport};

/// Warden daemon
pub struct Server {
    config: DaemonConfig,
    store: Arc<dyn ObjectStore>,
    events: EventRecorder,
}

impl Server {
    /// Create a server backed by a fresh in-memory store
    pub fn new(config: DaemonConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(config: DaemonConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            store,
            events: EventRecorder::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let (tx, rx) = watch::channel(false);
        let tasks = self.start(rx).await?;

        shutdown_signal().await;
        info!("Warden daemon shutting down");
        let _ = tx.send(true);

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Task panicked during shutdown");
            }
        }
        info!("Warden daemon stopped");
        Ok(())
    }

    /// Seed the store and spawn every controller; they stop when `shutdown`
    /// flips to `true`
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> DaemonResult<Vec<JoinHandle<()>>> {
        if let Some(path) = &self.config.store.seed_file {
            SeedFile::load(path)?.apply(self.store.clone()).await?;
        }

        let controller_config = &self.config.controller;
        let transport = Arc::new(DirectoryTransport::new(&self.config.store.artifact_dir));
        let instances = InstanceReconciler::new(
            self.store.clone(),
            transport,
            ArtifactCache::new(),
            self.events.clone(),
            controller_config.clone(),
        );
        let personalities = PersonalityReconciler::new(self.store.clone(), self.events.clone());
        let servers = McpServerReconciler::new(
            self.store.clone(),
            self.events.clone(),
            controller_config.operator_namespace.clone(),
        );

        let mut tasks = vec![
            tokio::spawn(
                Controller::new(instances, self.store.clone(), controller_config)
                    .run(shutdown.clone()),
            ),
            tokio::spawn(
                Controller::new(personalities, self.store.clone(), controller_config)
                    .run(shutdown.clone()),
            ),
            tokio::spawn(
                Controller::new(servers, self.store.clone(), controller_config)
                    .run(shutdown.clone()),
            ),
        ];

        if self.config.store.simulate_workloads {
            tasks.push(tokio::spawn(
                WorkloadSimulator::new(self.store.clone()).run(shutdown),
            ));
        }

        info!(
            operator_namespace = %controller_config.operator_namespace,
            workers = controller_config.workers,
            artifact_dir = %self.config.store.artifact_dir,
            "Controllers started"
        );
        Ok(tasks)
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
