//! Warden Template - Template resolution
//!
//! A template (Personality) comes either from a local object or from a
//! remote, content-addressed artifact. Both paths sit behind
//! [`TemplateResolver::resolve`] and hand back the same [`PersonalitySpec`]
//! shape, so the merge engine never knows which one was taken.
//!
//! Remote artifacts are decoded once per content digest and kept in an
//! append-only [`ArtifactCache`]. Every read returns an independent copy.
//!
//! [`PersonalitySpec`]: warden_types::PersonalitySpec

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod bundle;
pub mod cache;
pub mod digest;
pub mod error;
pub mod resolver;
pub mod transport;

pub use bundle::{decode, pack, BundleError, BundleLimits, MANIFEST_FILE, SOUL_FILE};
pub use cache::ArtifactCache;
pub use digest::{digest_from_reference, sha256_digest};
pub use error::{Result, TemplateError};
pub use resolver::{ResolvedTemplate, TemplateResolver, TemplateSource};
pub use transport::{
    ArtifactTransport, DirectoryTransport, FetchedArtifact, InMemoryTransport, TransportError,
};
