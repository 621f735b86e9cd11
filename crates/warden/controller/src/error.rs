//! Error types for reconciliation

use std::time::Duration;
use thiserror::Error;
use warden_merge::ValidationError;
use warden_store::StoreError;
use warden_template::TemplateError;

/// How a failed pass should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Self-heals once the world catches up
    Retryable,
    /// Cannot succeed until the user or a dependency fixes something
    TerminalUntilFixed,
    /// Misconfiguration detected before any mutation; must be renamed or removed
    Fatal,
}

/// Reconcile errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("template: {0}")]
    Template(#[from] TemplateError),

    #[error("MCP server {namespace}/{name} not found")]
    McpServerNotFound { namespace: String, name: String },

    #[error("MCP server {name} is not ready: {message}")]
    McpServerNotReady { name: String, message: String },

    #[error("secret {secret:?} is declared by both MCP servers {first:?} and {second:?}")]
    SecretCollision {
        secret: String,
        first: String,
        second: String,
    },

    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("secret {namespace}/{name} has no {key:?} entry")]
    SecretKeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("failed to render configuration: {0}")]
    Render(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("teardown incomplete: {}", .0.join("; "))]
    TeardownIncomplete(Vec<String>),
}

impl ReconcileError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ReconcileError::Validation(_) | ReconcileError::McpServerNotReady { .. } => {
                RetryClass::TerminalUntilFixed
            }
            ReconcileError::Template(e) if !e.is_retryable() => RetryClass::TerminalUntilFixed,
            ReconcileError::Render(_) => RetryClass::TerminalUntilFixed,
            ReconcileError::SecretCollision { .. } => RetryClass::Fatal,
            ReconcileError::Template(_)
            | ReconcileError::McpServerNotFound { .. }
            | ReconcileError::SecretNotFound { .. }
            | ReconcileError::SecretKeyMissing { .. }
            | ReconcileError::Store(_)
            | ReconcileError::TeardownIncomplete(_) => RetryClass::Retryable,
        }
    }

    /// Machine-readable reason used in conditions and events
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Validation(_) => "ValidationFailed",
            ReconcileError::Template(TemplateError::NotFound { .. }) => "PersonalityNotFound",
            ReconcileError::Template(TemplateError::Malformed { .. }) => "PersonalityMalformed",
            ReconcileError::Template(_) => "PersonalityFetchFailed",
            ReconcileError::McpServerNotFound { .. } => "McpServerNotFound",
            ReconcileError::McpServerNotReady { .. } => "McpServerNotReady",
            ReconcileError::SecretCollision { .. } => "McpSecretCollision",
            ReconcileError::SecretNotFound { .. } => "SecretNotFound",
            ReconcileError::SecretKeyMissing { .. } => "SecretKeyMissing",
            ReconcileError::Render(_) => "RenderFailed",
            ReconcileError::Store(_) => "ReconcileFailed",
            ReconcileError::TeardownIncomplete(_) => "TeardownFailed",
        }
    }
}

/// Result type for reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// What the work queue should do after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run again after a fixed delay
    Requeue(Duration),
    /// Wait for the next watch event
    AwaitChange,
}
