//! Template resolver

use crate::bundle::{decode, BundleLimits};
use crate::cache::ArtifactCache;
use crate::digest::sha256_digest;
use crate::error::{Result, TemplateError};
use crate::transport::{ArtifactTransport, TransportError};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use warden_store::Api;
use warden_types::{ObjectKey, Personality, PersonalitySpec, TemplateSelector};

/// Where a resolved template came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Local { name: String },
    Artifact { reference: String, digest: String },
}

#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub source: TemplateSource,
    pub spec: PersonalitySpec,
}

/// Resolves a template selector to the template shape
#[derive(Clone)]
pub struct TemplateResolver {
    personalities: Api<Personality>,
    transport: Arc<dyn ArtifactTransport>,
    cache: ArtifactCache,
    limits: BundleLimits,
}

impl TemplateResolver {
    pub fn new(
        personalities: Api<Personality>,
        transport: Arc<dyn ArtifactTransport>,
        cache: ArtifactCache,
    ) -> Self {
        Self {
            personalities,
            transport,
            cache,
            limits: BundleLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolve a selector; named templates are looked up in `namespace`
    pub async fn resolve(
        &self,
        selector: &TemplateSelector,
        namespace: &str,
    ) -> Result<ResolvedTemplate> {
        match selector {
            TemplateSelector::Named(name) => self.resolve_local(name, namespace).await,
            TemplateSelector::Artifact(reference) => self.resolve_artifact(reference).await,
        }
    }

    #[instrument(skip(self))]
    async fn resolve_local(&self, name: &str, namespace: &str) -> Result<ResolvedTemplate> {
        let key = ObjectKey::new(namespace, name);
        let personality = self
            .personalities
            .get_opt(&key)
            .await?
            .ok_or_else(|| TemplateError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        Ok(ResolvedTemplate {
            source: TemplateSource::Local {
                name: name.to_string(),
            },
            spec: personality.spec,
        })
    }

    #[instrument(skip(self))]
    async fn resolve_artifact(&self, reference: &str) -> Result<ResolvedTemplate> {
        let digest = self
            .transport
            .resolve_digest(reference)
            .await
            .map_err(|e| fetch_error(reference, e))?;

        if let Some(spec) = self.cache.get(&digest) {
            debug!(%digest, "Template cache hit");
            return Ok(ResolvedTemplate {
                source: TemplateSource::Artifact {
                    reference: reference.to_string(),
                    digest,
                },
                spec,
            });
        }

        let fetched = self
            .transport
            .fetch(reference)
            .await
            .map_err(|e| fetch_error(reference, e))?;

        let actual = sha256_digest(&fetched.bytes);
        if actual != fetched.digest || actual != digest {
            return Err(TemplateError::Malformed {
                reference: reference.to_string(),
                message: format!("content digest {actual} does not match {digest}"),
            });
        }

        let spec = decode(&fetched.bytes, &self.limits)
            .map_err(|e| TemplateError::malformed(reference, &e))?;
        let spec = self.cache.insert(&digest, spec);
        info!(%digest, "Cached remote template");

        Ok(ResolvedTemplate {
            source: TemplateSource::Artifact {
                reference: reference.to_string(),
                digest,
            },
            spec,
        })
    }
}

fn fetch_error(reference: &str, error: TransportError) -> TemplateError {
    match error {
        TransportError::TooLarge { .. } => TemplateError::Malformed {
            reference: reference.to_string(),
            message: error.to_string(),
        },
        TransportError::NotFound(_) | TransportError::Unavailable(_) => TemplateError::Fetch {
            reference: reference.to_string(),
            message: error.to_string(),
        },
    }
}
