//! MCP server status controller
//!
//! Checks that each shared descriptor is internally consistent and that
//! the secrets it binds exist in the operator namespace. Instances refuse
//! to resolve a descriptor whose `Ready` condition is false.

use crate::conditions::{self, reason};
use crate::error::{Action, Result};
use crate::events::EventRecorder;
use crate::runtime::Reconcile;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use warden_store::{Api, ObjectStore, WatchEvent};
use warden_types::{
    set_condition, Condition, Instance, Kind, McpServer, McpServerSpec, McpServerStatus,
    ObjectKey, Resource, Secret, STDIO_TRANSPORT, URL_TRANSPORTS,
};

/// Structural problems with a descriptor, if any
pub fn validate_server(spec: &McpServerSpec) -> std::result::Result<(), String> {
    let transport = spec.transport.as_str();
    if transport.is_empty() {
        return Err("type is required".to_string());
    }
    if URL_TRANSPORTS.contains(&transport) {
        if spec.url.is_empty() {
            return Err(format!("url is required for type {transport:?}"));
        }
    } else if transport == STDIO_TRANSPORT {
        if spec.command.is_empty() {
            return Err("command is required for type \"stdio\"".to_string());
        }
    } else {
        return Err(format!("unsupported type {transport:?}"));
    }
    Ok(())
}

pub struct McpServerReconciler {
    servers: Api<McpServer>,
    instances: Api<Instance>,
    secrets: Api<Secret>,
    events: EventRecorder,
    operator_namespace: String,
}

impl McpServerReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: EventRecorder,
        operator_namespace: impl Into<String>,
    ) -> Self {
        Self {
            servers: Api::new(store.clone()),
            instances: Api::new(store.clone()),
            secrets: Api::new(store),
            events,
            operator_namespace: operator_namespace.into(),
        }
    }

    async fn missing_secrets(&self, spec: &McpServerSpec) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for name in spec.secret_names() {
            let key = ObjectKey::new(&self.operator_namespace, name);
            if self.secrets.get_opt(&key).await?.is_none() && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        Ok(missing)
    }

    async fn instance_count(&self, name: &str) -> Result<u32> {
        let referencing = self
            .instances
            .list(None, &BTreeMap::new())
            .await?
            .iter()
            .filter(|i| !i.metadata.is_deleting() && i.mcp_server_refs().any(|r| r == name))
            .count();
        Ok(u32::try_from(referencing).unwrap_or(u32::MAX))
    }

    #[instrument(skip(self), fields(mcp_server = %key))]
    async fn reconcile_server(&self, key: &ObjectKey) -> Result<Action> {
        let Some(live) = self.servers.get_opt(key).await? else {
            return Ok(Action::AwaitChange);
        };
        if key.namespace != self.operator_namespace {
            debug!("Outside the operator namespace, ignoring");
            return Ok(Action::AwaitChange);
        }
        let generation = live.metadata.generation;

        let mut status = McpServerStatus {
            conditions: live.status.conditions.clone(),
            instance_count: self.instance_count(&key.name).await?,
            observed_generation: generation,
        };

        let valid = validate_server(&live.spec);
        let valid_condition = match &valid {
            Ok(()) => Condition::new(
                conditions::VALID,
                true,
                reason::VALIDATION_PASSED,
                "Descriptor is valid",
                generation,
            ),
            Err(message) => Condition::new(
                conditions::VALID,
                false,
                reason::VALIDATION_FAILED,
                message.clone(),
                generation,
            ),
        };
        if set_condition(&mut status.conditions, valid_condition) {
            if let Err(message) = &valid {
                self.events
                    .warning(Kind::McpServer, key, reason::VALIDATION_FAILED, message.clone())
                    .await;
            }
        }

        let missing = self.missing_secrets(&live.spec).await?;
        let secrets_condition = if missing.is_empty() {
            Condition::new(
                conditions::SECRETS_VALID,
                true,
                reason::SECRETS_FOUND,
                "All referenced secrets exist",
                generation,
            )
        } else {
            Condition::new(
                conditions::SECRETS_VALID,
                false,
                reason::SECRET_NOT_FOUND,
                format!("missing secrets: {}", missing.join(", ")),
                generation,
            )
        };
        if set_condition(&mut status.conditions, secrets_condition) && !missing.is_empty() {
            warn!(?missing, "Referenced secrets are missing");
            self.events
                .warning(
                    Kind::McpServer,
                    key,
                    reason::SECRET_NOT_FOUND,
                    format!("missing secrets: {}", missing.join(", ")),
                )
                .await;
        }

        let ready = match (&valid, missing.is_empty()) {
            (Ok(()), true) => {
                Condition::new(conditions::READY, true, reason::RECONCILED, "Ready", generation)
            }
            (Err(message), _) => Condition::new(
                conditions::READY,
                false,
                reason::VALIDATION_FAILED,
                message.clone(),
                generation,
            ),
            (Ok(()), false) => Condition::new(
                conditions::READY,
                false,
                reason::SECRET_NOT_FOUND,
                format!("missing secrets: {}", missing.join(", ")),
                generation,
            ),
        };
        set_condition(&mut status.conditions, ready);

        self.servers
            .patch_status(key, |s| s.status = status.clone())
            .await?;
        debug!(instances = status.instance_count, "MCP server status updated");
        Ok(Action::AwaitChange)
    }
}

#[async_trait]
impl Reconcile for McpServerReconciler {
    fn name(&self) -> &'static str {
        "mcp-server"
    }

    async fn list_keys(&self) -> Result<Vec<ObjectKey>> {
        Ok(self
            .servers
            .list(Some(&self.operator_namespace), &BTreeMap::new())
            .await?
            .iter()
            .map(Resource::key)
            .collect())
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        self.reconcile_server(key).await
    }

    async fn map_event(&self, event: &WatchEvent) -> Vec<ObjectKey> {
        let key = event.key();
        match event.kind() {
            Kind::McpServer if key.namespace == self.operator_namespace => vec![key],
            Kind::Secret if key.namespace == self.operator_namespace => {
                match self
                    .servers
                    .list(Some(&self.operator_namespace), &BTreeMap::new())
                    .await
                {
                    Ok(servers) => servers
                        .iter()
                        .filter(|s| s.spec.secret_names().any(|n| n == key.name))
                        .map(Resource::key)
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, "Failed to list MCP servers for event mapping");
                        Vec::new()
                    }
                }
            }
            Kind::Instance => match event.object.clone().into_resource::<Instance>() {
                Ok(instance) => instance
                    .mcp_server_refs()
                    .map(|name| ObjectKey::new(&self.operator_namespace, name))
                    .collect(),
                Err(_) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
