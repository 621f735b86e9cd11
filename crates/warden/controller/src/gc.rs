//! Garbage collection of propagated shared credentials
//!
//! Copies of shared secrets are owner-scoped rather than instance-scoped, so
//! they cannot be deleted together with one instance. This sweep keeps every
//! copy still needed by a live instance of the same owner and removes the
//! rest. An instance's references include those inherited from its
//! template, so templates are resolved before anything is deleted.

use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use warden_merge::merge_personality;
use warden_store::Api;
use warden_template::TemplateResolver;
use warden_types::naming::{mcp_secret_labels, user_namespace};
use warden_types::{Instance, McpServer, Resource, Secret};

#[derive(Clone)]
pub struct SecretCollector {
    instances: Api<Instance>,
    servers: Api<McpServer>,
    secrets: Api<Secret>,
    templates: TemplateResolver,
    operator_namespace: String,
}

impl SecretCollector {
    pub fn new(
        instances: Api<Instance>,
        servers: Api<McpServer>,
        secrets: Api<Secret>,
        templates: TemplateResolver,
        operator_namespace: impl Into<String>,
    ) -> Self {
        Self {
            instances,
            servers,
            secrets,
            templates,
            operator_namespace: operator_namespace.into(),
        }
    }

    /// Shared server names an instance references once its template is
    /// merged in, or `None` when the template cannot be resolved right now
    async fn effective_refs(&self, instance: &Instance) -> Option<Vec<String>> {
        let Some(selector) = &instance.spec.personality else {
            return Some(instance.mcp_server_refs().map(str::to_string).collect());
        };
        match self
            .templates
            .resolve(selector, &instance.metadata.namespace)
            .await
        {
            Ok(resolved) => {
                let merged = merge_personality(&resolved.spec, &instance.spec);
                Some(merged.bundle.mcp_servers.into_iter().map(|r| r.name).collect())
            }
            Err(e) => {
                warn!(instance = %instance.key(), error = %e, "Cannot resolve template for credential sweep");
                None
            }
        }
    }

    /// Secret names still needed by non-deleting instances of `owner`.
    ///
    /// `None` means some instance's references are unknown and nothing may
    /// be deleted on this pass.
    async fn desired_secrets(&self, owner: &str) -> Result<Option<BTreeSet<String>>> {
        let tenant = user_namespace(owner);
        let by_server: BTreeMap<String, Vec<String>> = self
            .servers
            .list(Some(&self.operator_namespace), &Default::default())
            .await?
            .into_iter()
            .map(|server| {
                let secrets = server.spec.secret_names().map(str::to_string).collect();
                (server.metadata.name, secrets)
            })
            .collect();

        let mut desired = BTreeSet::new();
        for instance in self.instances.list(None, &Default::default()).await? {
            if instance.metadata.is_deleting() || user_namespace(&instance.spec.owner) != tenant {
                continue;
            }
            let Some(refs) = self.effective_refs(&instance).await else {
                return Ok(None);
            };
            // A vanished server contributes nothing
            for name in refs {
                if let Some(secrets) = by_server.get(&name) {
                    desired.extend(secrets.iter().cloned());
                }
            }
        }
        Ok(Some(desired))
    }

    /// Delete owner-scoped credential copies nobody references any more.
    ///
    /// Returns the names of the deleted secrets.
    pub async fn collect(&self, owner: &str) -> Result<Vec<String>> {
        let namespace = user_namespace(owner);
        let Some(desired) = self.desired_secrets(owner).await? else {
            debug!(%namespace, "Skipping credential sweep");
            return Ok(Vec::new());
        };
        let copies = self
            .secrets
            .list(Some(&namespace), &mcp_secret_labels(owner))
            .await?;

        let mut deleted = Vec::new();
        for secret in copies {
            if desired.contains(secret.name()) {
                continue;
            }
            match self.secrets.delete_ignore_missing(&secret.key()).await {
                Ok(true) => {
                    info!(secret = %secret.key(), "Removed unreferenced credential copy");
                    deleted.push(secret.name().to_string());
                }
                Ok(false) => debug!(secret = %secret.key(), "Credential copy already gone"),
                Err(e) => {
                    warn!(secret = %secret.key(), error = %e, "Failed to remove credential copy");
                    return Err(e.into());
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_store::{InMemoryStore, ObjectStore};
    use warden_template::{ArtifactCache, InMemoryTransport};
    use warden_types::{
        CredentialSource, InstanceSpec, McpServerReference, McpServerSpec, ObjectKey, Personality,
        PersonalitySpec, TemplateSelector,
    };

    struct Fixture {
        store: Arc<dyn ObjectStore>,
        collector: SecretCollector,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let templates = TemplateResolver::new(
            Api::new(store.clone()),
            Arc::new(InMemoryTransport::new()),
            ArtifactCache::new(),
        );
        let collector = SecretCollector::new(
            Api::new(store.clone()),
            Api::new(store.clone()),
            Api::new(store.clone()),
            templates,
            "warden-system",
        );
        Fixture { store, collector }
    }

    fn instance(name: &str, owner: &str, refs: &[&str]) -> Instance {
        let mut spec = InstanceSpec {
            owner: owner.into(),
            ..Default::default()
        };
        spec.bundle.mcp_servers = refs.iter().map(|r| McpServerReference::new(*r)).collect();
        Instance::new("team", name, spec)
    }

    fn copy(owner: &str, name: &str) -> Secret {
        let mut secret = Secret::new(user_namespace(owner), name);
        secret.metadata.labels = mcp_secret_labels(owner);
        secret
    }

    async fn github_server(store: &Arc<dyn ObjectStore>) {
        let servers: Api<McpServer> = Api::new(store.clone());
        servers
            .create(&McpServer::new(
                "warden-system",
                "github",
                McpServerSpec {
                    transport: "streamable-http".into(),
                    url: "https://gh/mcp".into(),
                    secret_refs: vec![CredentialSource::new("gh-token").with_env("T", "t")],
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
    }

    async fn copy_exists(store: &Arc<dyn ObjectStore>, owner: &str, name: &str) -> bool {
        let secrets: Api<Secret> = Api::new(store.clone());
        secrets
            .get_opt(&ObjectKey::new(user_namespace(owner), name))
            .await
            .unwrap()
            .is_some()
    }

    #[tokio::test]
    async fn test_secret_shared_with_live_instance_survives() {
        let f = fixture();
        let instances: Api<Instance> = Api::new(f.store.clone());
        let secrets: Api<Secret> = Api::new(f.store.clone());

        github_server(&f.store).await;
        instances
            .create(&instance("b", "alice", &["github"]))
            .await
            .unwrap();
        secrets.create(&copy("alice", "gh-token")).await.unwrap();
        secrets.create(&copy("alice", "stale")).await.unwrap();

        let deleted = f.collector.collect("alice").await.unwrap();
        assert_eq!(deleted, vec!["stale".to_string()]);
        assert!(copy_exists(&f.store, "alice", "gh-token").await);
    }

    #[tokio::test]
    async fn test_reference_inherited_from_template_keeps_copy() {
        let f = fixture();
        let instances: Api<Instance> = Api::new(f.store.clone());
        let personalities: Api<Personality> = Api::new(f.store.clone());
        let secrets: Api<Secret> = Api::new(f.store.clone());

        github_server(&f.store).await;
        let mut template = PersonalitySpec::default();
        template.bundle.mcp_servers = vec![McpServerReference::new("github")];
        personalities
            .create(&Personality::new("team", "dev", template))
            .await
            .unwrap();

        let mut inherits = instance("b", "alice", &[]);
        inherits.spec.personality = Some(TemplateSelector::Named("dev".into()));
        instances.create(&inherits).await.unwrap();
        secrets.create(&copy("alice", "gh-token")).await.unwrap();

        let deleted = f.collector.collect("alice").await.unwrap();
        assert!(deleted.is_empty());
        assert!(copy_exists(&f.store, "alice", "gh-token").await);
    }

    #[tokio::test]
    async fn test_unresolvable_template_skips_sweep() {
        let f = fixture();
        let instances: Api<Instance> = Api::new(f.store.clone());
        let secrets: Api<Secret> = Api::new(f.store.clone());

        let mut orphaned = instance("b", "alice", &[]);
        orphaned.spec.personality = Some(TemplateSelector::Named("missing".into()));
        instances.create(&orphaned).await.unwrap();
        secrets.create(&copy("alice", "gh-token")).await.unwrap();

        assert!(f.collector.collect("alice").await.unwrap().is_empty());
        assert!(copy_exists(&f.store, "alice", "gh-token").await);
    }

    #[tokio::test]
    async fn test_other_owners_are_untouched() {
        let f = fixture();
        let secrets: Api<Secret> = Api::new(f.store.clone());
        secrets.create(&copy("bob", "gh-token")).await.unwrap();

        let deleted = f.collector.collect("alice").await.unwrap();
        assert!(deleted.is_empty());
        assert_eq!(
            secrets
                .list(Some(&user_namespace("bob")), &Default::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
