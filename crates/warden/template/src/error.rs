//! Error types for template resolution

use crate::bundle::BundleError;
use thiserror::Error;
use warden_store::StoreError;

/// Template resolution errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The named Personality does not exist (yet)
    #[error("personality {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    /// The artifact could not be fetched
    #[error("failed to fetch {reference}: {message}")]
    Fetch { reference: String, message: String },

    /// The artifact was fetched but cannot be used until republished
    #[error("malformed artifact {reference}: {message}")]
    Malformed { reference: String, message: String },

    /// Backing store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl TemplateError {
    /// Whether retrying without a spec change can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TemplateError::Malformed { .. })
    }

    pub(crate) fn malformed(reference: &str, error: &BundleError) -> Self {
        TemplateError::Malformed {
            reference: reference.to_string(),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
