//! Daemon error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("seed file {path}: {message}")]
    Seed { path: String, message: String },

    #[error("store error: {0}")]
    Store(#[from] warden_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
