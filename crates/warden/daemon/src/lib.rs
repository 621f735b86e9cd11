//! Warden Daemon library
//!
//! Runs the instance, personality and MCP server controllers against a
//! local object store:
//! - layered configuration (defaults, file, `WARDEN_*` environment)
//! - start-up seeding from a YAML file
//! - an optional workload simulator standing in for a scheduler
//! - graceful shutdown on Ctrl+C or SIGTERM

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod seed;
pub mod server;
pub mod simulator;

pub use config::{DaemonConfig, LoggingConfig, StoreConfig};
pub use error::{DaemonError, DaemonResult};
pub use seed::{SeedFile, SeedSecret};
pub use server::Server;
pub use simulator::WorkloadSimulator;
