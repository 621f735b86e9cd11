//! Shared tool-integration resolution
//!
//! Resolves an instance's references to shared MCP servers living in the
//! operator namespace and folds them into the instance's inline tool
//! config. Credentials are copied into the tenant namespace separately, by
//! [`McpResolver::propagate`], once the merged instance has been validated.
//!
//! Resolution is all-or-nothing: an instance never runs with half of its
//! integrations. Every descriptor and every source secret is read before
//! the first copy is written.

use crate::conditions::{self, reason};
use crate::error::{ReconcileError, Result};
use crate::events::EventRecorder;
use crate::resources::build_mcp_secret_copy;
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use warden_merge::merge_credentials;
use warden_store::Api;
use warden_types::{
    find_condition, is_condition_false, CredentialSource, Instance, Kind, McpServer, ObjectKey,
    Resource, Secret, ToolConfig,
};

/// One resolved reference, still in reference order
#[derive(Debug, Clone)]
struct ResolvedServer {
    name: String,
    config: ToolConfig,
    secret_refs: Vec<CredentialSource>,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedIntegrations {
    /// Names of shared servers folded into the tool config
    pub servers: Vec<String>,
    /// Source secrets to copy into the tenant namespace, in first-seen order
    pub sources: Vec<Secret>,
}

impl ResolvedIntegrations {
    pub fn secret_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

#[derive(Clone)]
pub struct McpResolver {
    servers: Api<McpServer>,
    secrets: Api<Secret>,
    events: EventRecorder,
    operator_namespace: String,
}

impl McpResolver {
    pub fn new(
        servers: Api<McpServer>,
        secrets: Api<Secret>,
        events: EventRecorder,
        operator_namespace: impl Into<String>,
    ) -> Self {
        Self {
            servers,
            secrets,
            events,
            operator_namespace: operator_namespace.into(),
        }
    }

    /// Resolve every shared reference of `instance` into its working copy.
    ///
    /// Reads only; nothing is written until [`propagate`](Self::propagate).
    #[instrument(skip(self, instance), fields(instance = %instance.key()))]
    pub async fn resolve_all(&self, instance: &mut Instance) -> Result<ResolvedIntegrations> {
        let refs: Vec<String> = instance.mcp_server_refs().map(str::to_string).collect();
        if refs.is_empty() {
            return Ok(ResolvedIntegrations::default());
        }

        let mut resolved = Vec::with_capacity(refs.len());
        for name in &refs {
            resolved.push(self.resolve_one(name).await?);
        }

        let secret_names = check_collisions(&resolved)?;
        let sources = self.read_sources(&secret_names).await?;

        self.fold_into(instance, &resolved).await;

        Ok(ResolvedIntegrations {
            servers: resolved.into_iter().map(|r| r.name).collect(),
            sources,
        })
    }

    /// Copy the resolved source secrets into the owner's namespace
    pub async fn propagate(
        &self,
        resolved: &ResolvedIntegrations,
        tenant_namespace: &str,
        owner: &str,
    ) -> Result<()> {
        for source in &resolved.sources {
            let copy = build_mcp_secret_copy(source, tenant_namespace, owner);
            let (_, result) = self.secrets.apply(&copy).await?;
            debug!(secret = %source.name(), namespace = tenant_namespace, ?result, "Propagated credential");
        }
        Ok(())
    }

    async fn resolve_one(&self, name: &str) -> Result<ResolvedServer> {
        let key = ObjectKey::new(&self.operator_namespace, name);
        let server = self
            .servers
            .get_opt(&key)
            .await?
            .ok_or_else(|| ReconcileError::McpServerNotFound {
                namespace: self.operator_namespace.clone(),
                name: name.to_string(),
            })?;

        if is_condition_false(&server.status.conditions, conditions::READY) {
            let message = find_condition(&server.status.conditions, conditions::READY)
                .map(|c| c.message.clone())
                .unwrap_or_default();
            return Err(ReconcileError::McpServerNotReady {
                name: name.to_string(),
                message,
            });
        }

        Ok(ResolvedServer {
            name: name.to_string(),
            config: server.spec.to_tool_config().into(),
            secret_refs: server.spec.secret_refs.clone(),
        })
    }

    /// Read every source secret before anything is written
    async fn read_sources(&self, names: &[String]) -> Result<Vec<Secret>> {
        let mut sources = Vec::with_capacity(names.len());
        for name in names {
            let key = ObjectKey::new(&self.operator_namespace, name);
            let secret =
                self.secrets
                    .get_opt(&key)
                    .await?
                    .ok_or_else(|| ReconcileError::SecretNotFound {
                        namespace: self.operator_namespace.clone(),
                        name: name.clone(),
                    })?;
            sources.push(secret);
        }
        Ok(sources)
    }

    async fn fold_into(&self, instance: &mut Instance, resolved: &[ResolvedServer]) {
        let key = instance.key();
        let agent = &mut instance.spec.bundle.agent;

        for server in resolved {
            if let Some(previous) = agent.mcp_servers.get(&server.name) {
                if *previous != server.config {
                    self.events
                        .normal(
                            Kind::Instance,
                            &key,
                            reason::MCP_SERVER_OVERRIDE,
                            format!(
                                "shared MCP server {:?} replaces the inline entry of the same name",
                                server.name
                            ),
                        )
                        .await;
                }
            }
            agent
                .mcp_servers
                .insert(server.name.clone(), server.config.clone());
        }

        let resolved_refs: Vec<CredentialSource> = resolved
            .iter()
            .flat_map(|s| s.secret_refs.iter().cloned())
            .collect();
        agent.mcp_server_secrets = merge_credentials(&agent.mcp_server_secrets, &resolved_refs);
    }
}

/// Secret names in first-seen order, failing when two references share one
fn check_collisions(resolved: &[ResolvedServer]) -> Result<Vec<String>> {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    let mut ordered = Vec::new();
    for server in resolved {
        for secret in server.secret_refs.iter().map(|s| s.secret_name.as_str()) {
            match owners.get(secret) {
                Some(first) if *first != server.name => {
                    return Err(ReconcileError::SecretCollision {
                        secret: secret.to_string(),
                        first: first.to_string(),
                        second: server.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(secret, &server.name);
                    ordered.push(secret.to_string());
                }
            }
        }
    }
    Ok(ordered)
}
