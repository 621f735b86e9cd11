//! Artifact transport contract and implementations

use crate::digest::{digest_from_reference, sha256_digest};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Largest compressed payload a transport will hand back
pub const MAX_PAYLOAD_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("artifact {0} not found")]
    NotFound(String),

    #[error("artifact {reference} is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        reference: String,
        size: u64,
        limit: u64,
    },

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// An immutable, content-addressed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub digest: String,
    pub bytes: Vec<u8>,
}

/// Fetches template bundles by tag or digest reference
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// Resolve a reference to the digest of the content it currently names
    async fn resolve_digest(&self, reference: &str) -> Result<String, TransportError>;

    /// Fetch the payload named by a reference
    async fn fetch(&self, reference: &str) -> Result<FetchedArtifact, TransportError>;
}

/// In-process registry of published artifacts
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    artifacts: DashMap<String, FetchedArtifact>,
    fetches: AtomicUsize,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload under a reference; returns its digest.
    ///
    /// The payload is also reachable as `<repository>@<digest>`.
    pub fn publish(&self, reference: &str, bytes: Vec<u8>) -> String {
        let digest = sha256_digest(&bytes);
        let artifact = FetchedArtifact {
            digest: digest.clone(),
            bytes,
        };
        let repository = reference
            .rsplit_once(':')
            .filter(|(_, tag)| !tag.contains('/'))
            .map_or(reference, |(repo, _)| repo);
        self.artifacts
            .insert(format!("{repository}@{digest}"), artifact.clone());
        self.artifacts.insert(reference.to_string(), artifact);
        digest
    }

    /// Publish with a claimed digest that need not match the payload
    pub fn publish_raw(&self, reference: &str, digest: &str, bytes: Vec<u8>) {
        self.artifacts.insert(
            reference.to_string(),
            FetchedArtifact {
                digest: digest.to_string(),
                bytes,
            },
        );
    }

    /// Number of `fetch` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactTransport for InMemoryTransport {
    async fn resolve_digest(&self, reference: &str) -> Result<String, TransportError> {
        if let Some(digest) = digest_from_reference(reference) {
            return Ok(digest.to_string());
        }
        self.artifacts
            .get(reference)
            .map(|a| a.digest.clone())
            .ok_or_else(|| TransportError::NotFound(reference.to_string()))
    }

    async fn fetch(&self, reference: &str) -> Result<FetchedArtifact, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let artifact = self
            .artifacts
            .get(reference)
            .map(|a| a.value().clone())
            .ok_or_else(|| TransportError::NotFound(reference.to_string()))?;
        let size = artifact.bytes.len() as u64;
        if size > MAX_PAYLOAD_BYTES {
            return Err(TransportError::TooLarge {
                reference: reference.to_string(),
                size,
                limit: MAX_PAYLOAD_BYTES,
            });
        }
        Ok(artifact)
    }
}

/// Serves bundles from `<root>/<reference>.tar.gz`.
///
/// Path separators, `:` and `@` in the reference are mapped to `_`.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: Arc<PathBuf>,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    fn path_for(&self, reference: &str) -> PathBuf {
        let file: String = reference
            .chars()
            .map(|c| if matches!(c, '/' | ':' | '@') { '_' } else { c })
            .collect();
        self.root.join(format!("{file}.tar.gz"))
    }

    async fn read(&self, reference: &str) -> Result<Vec<u8>, TransportError> {
        let path = self.path_for(reference);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(reference.to_string()))
            }
            Err(e) => return Err(TransportError::Unavailable(e.to_string())),
        };
        if metadata.len() > MAX_PAYLOAD_BYTES {
            return Err(TransportError::TooLarge {
                reference: reference.to_string(),
                size: metadata.len(),
                limit: MAX_PAYLOAD_BYTES,
            });
        }
        debug!(path = %path.display(), "Reading artifact");
        tokio::fs::read(&path)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ArtifactTransport for DirectoryTransport {
    async fn resolve_digest(&self, reference: &str) -> Result<String, TransportError> {
        if let Some(digest) = digest_from_reference(reference) {
            return Ok(digest.to_string());
        }
        Ok(sha256_digest(&self.read(reference).await?))
    }

    async fn fetch(&self, reference: &str) -> Result<FetchedArtifact, TransportError> {
        let bytes = self.read(reference).await?;
        Ok(FetchedArtifact {
            digest: sha256_digest(&bytes),
            bytes,
        })
    }
}
