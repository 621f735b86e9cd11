//! Digest-keyed template cache
//!
//! Entries are immutable once inserted and never evicted. Reads hand out
//! owned copies so no caller can mutate a shared entry.

use dashmap::DashMap;
use std::sync::Arc;
use warden_types::PersonalitySpec;

#[derive(Debug, Clone, Default)]
pub struct ArtifactCache {
    entries: Arc<DashMap<String, Arc<PersonalitySpec>>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the template decoded from `digest`, if cached
    pub fn get(&self, digest: &str) -> Option<PersonalitySpec> {
        self.entries
            .get(digest)
            .map(|entry| PersonalitySpec::clone(entry.value()))
    }

    /// Insert a decoded template. The first insert for a digest wins.
    pub fn insert(&self, digest: &str, spec: PersonalitySpec) -> PersonalitySpec {
        let entry = self
            .entries
            .entry(digest.to_string())
            .or_insert_with(|| Arc::new(spec));
        PersonalitySpec::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
