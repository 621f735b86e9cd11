//! Warden Daemon - Agent instance operator
//!
//! Reconciles agent instances, their templates and shared tool
//! integrations until interrupted.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_daemon::{DaemonConfig, Server};

/// Warden Daemon CLI
#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Warden Daemon - Agent instance operator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<String>,

    /// Seed file loaded into the store at start-up
    #[arg(short, long, env = "WARDEN_SEED")]
    seed: Option<String>,

    /// Reconcile workers per controller
    #[arg(short, long, env = "WARDEN_WORKERS")]
    workers: Option<usize>,

    /// Log level
    #[arg(long, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "WARDEN_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // CLI flags win over file and environment
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(workers) = cli.workers {
        config.controller.workers = workers;
    }
    if cli.seed.is_some() {
        config.store.seed_file = cli.seed;
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        operator_namespace = %config.controller.operator_namespace,
        "Starting wardend"
    );

    Server::new(config).run().await?;
    Ok(())
}
