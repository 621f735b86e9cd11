//! Instance reconciler
//!
//! One pass converges the dependent infrastructure of one instance:
//!
//! 1. attach the finalizer
//! 2. resolve the template and shared integrations into a private copy
//! 3. validate the merged copy
//! 4. apply namespace and shared credentials, then sweep credential copies
//!    the owner no longer references
//! 5. apply API key, git credential, config map, claim, identity, workload,
//!    service and tool-directory registration, in that order
//! 6. derive state and conditions from workload availability
//!
//! Deletion runs the teardown in [`teardown`] instead.

mod status;
mod teardown;

use crate::conditions::{self, reason};
use crate::config::ControllerConfig;
use crate::error::{Action, ReconcileError, Result};
use crate::events::EventRecorder;
use crate::gc::SecretCollector;
use crate::integrations::McpResolver;
use crate::resources::{
    build_api_key_secret, build_config_map, build_git_secret_copy, build_namespace, build_pvc,
    build_registration, build_service, build_service_account, build_workload, config_checksum,
};
use crate::runtime::Reconcile;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use warden_merge::{merge_personality, validate_instance};
use warden_store::{Api, ObjectStore, WatchEvent};
use warden_template::{ArtifactCache, ArtifactTransport, TemplateResolver};
use warden_types::naming::{
    self, sanitize_label_value, user_namespace, FINALIZER, LABEL_INSTANCE, LABEL_OWNER,
};
use warden_types::{
    set_condition, Condition, ConfigMap, Instance, InstanceState, InstanceStatus, Kind, McpServer,
    Namespace, ObjectKey, PersistentVolumeClaim, Personality, Resource, Secret, Service,
    ServiceAccount, TemplateSelector, ToolRegistration, Workload,
};

/// Typed handles for every kind the reconciler touches
#[derive(Clone)]
pub(crate) struct Apis {
    pub instances: Api<Instance>,
    pub namespaces: Api<Namespace>,
    pub secrets: Api<Secret>,
    pub config_maps: Api<ConfigMap>,
    pub pvcs: Api<PersistentVolumeClaim>,
    pub service_accounts: Api<ServiceAccount>,
    pub workloads: Api<Workload>,
    pub services: Api<Service>,
    pub registrations: Api<ToolRegistration>,
}

impl Apis {
    fn new(store: &Arc<dyn ObjectStore>) -> Self {
        Self {
            instances: Api::new(store.clone()),
            namespaces: Api::new(store.clone()),
            secrets: Api::new(store.clone()),
            config_maps: Api::new(store.clone()),
            pvcs: Api::new(store.clone()),
            service_accounts: Api::new(store.clone()),
            workloads: Api::new(store.clone()),
            services: Api::new(store.clone()),
            registrations: Api::new(store.clone()),
        }
    }
}

/// Converges instances to their declared state
#[derive(Clone)]
pub struct InstanceReconciler {
    store: Arc<dyn ObjectStore>,
    apis: Apis,
    templates: TemplateResolver,
    integrations: McpResolver,
    collector: SecretCollector,
    events: EventRecorder,
    config: Arc<ControllerConfig>,
}

impl InstanceReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transport: Arc<dyn ArtifactTransport>,
        cache: ArtifactCache,
        events: EventRecorder,
        config: ControllerConfig,
    ) -> Self {
        let apis = Apis::new(&store);
        let templates =
            TemplateResolver::new(Api::<Personality>::new(store.clone()), transport, cache);
        let integrations = McpResolver::new(
            Api::<McpServer>::new(store.clone()),
            apis.secrets.clone(),
            events.clone(),
            config.operator_namespace.clone(),
        );
        let collector = SecretCollector::new(
            apis.instances.clone(),
            Api::<McpServer>::new(store.clone()),
            apis.secrets.clone(),
            templates.clone(),
            config.operator_namespace.clone(),
        );
        Self {
            store,
            apis,
            templates,
            integrations,
            collector,
            events,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }

    /// Run one pass for the instance at `key`
    #[instrument(skip(self), fields(instance = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(live) = self.apis.instances.get_opt(key).await? else {
            debug!("Instance gone, nothing to do");
            return Ok(Action::AwaitChange);
        };

        if live.metadata.is_deleting() {
            return self.teardown(live).await;
        }

        let live = self.ensure_finalizer(live).await?;
        let mut status = live.status.clone();
        if status.state == InstanceState::New {
            status.state = InstanceState::Pending;
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::READY,
                    false,
                    reason::PROGRESSING,
                    "Resolving configuration",
                    live.metadata.generation,
                ),
            );
            self.write_status(key, &status).await?;
        }

        match self.converge(&live, &mut status).await {
            Ok(action) => {
                status.observed_generation = live.metadata.generation;
                self.write_status(key, &status).await?;
                Ok(action)
            }
            Err(err) => {
                self.record_failure(&live, &mut status, &err).await;
                Err(err)
            }
        }
    }

    async fn ensure_finalizer(&self, live: Instance) -> Result<Instance> {
        if live.metadata.has_finalizer(FINALIZER) {
            return Ok(live);
        }
        let mut updated = live;
        updated.metadata.add_finalizer(FINALIZER);
        let updated = self.apis.instances.replace(&updated).await?;
        debug!("Attached finalizer");
        Ok(updated)
    }

    async fn converge(&self, live: &Instance, status: &mut InstanceStatus) -> Result<Action> {
        let generation = live.metadata.generation;
        let config = &*self.config;

        // Nothing below touches the cached original
        let mut working = live.clone();
        let namespace = user_namespace(&working.spec.owner);

        match &live.spec.personality {
            Some(selector) => {
                let resolved = self
                    .templates
                    .resolve(selector, &live.metadata.namespace)
                    .await?;
                working.spec = merge_personality(&resolved.spec, &working.spec);
                status.personality = selector.display_name().to_string();
                debug!(personality = %selector, source = ?resolved.source, "Applied template");
            }
            None => status.personality.clear(),
        }
        let declared_servers = working.spec.bundle.mcp_server_count();

        let integrations = self.integrations.resolve_all(&mut working).await?;
        if !integrations.servers.is_empty() {
            debug!(
                servers = ?integrations.servers,
                secrets = ?integrations.secret_names(),
                "Resolved shared integrations"
            );
        }
        validate_instance(&working.spec)?;

        self.apis
            .namespaces
            .apply(&build_namespace(&working.spec.owner))
            .await?;
        self.integrations
            .propagate(&integrations, &namespace, &working.spec.owner)
            .await?;
        let collected = self.collector.collect(&working.spec.owner).await?;
        if !collected.is_empty() {
            debug!(?collected, "Removed stale credential copies");
        }

        let source_key = ObjectKey::new(&config.operator_namespace, &config.api_key_secret);
        let Some(api_key) = self.apis.secrets.get_opt(&source_key).await? else {
            warn!(secret = %source_key, "API key secret not provisioned yet");
            status.state = InstanceState::Pending;
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::READY,
                    false,
                    reason::API_KEY_MISSING,
                    format!("API key secret {source_key} not found"),
                    generation,
                ),
            );
            return Ok(Action::Requeue(config.api_key_requeue()));
        };
        let api_key = api_key.data.get(&config.api_key_key).ok_or_else(|| {
            ReconcileError::SecretKeyMissing {
                namespace: source_key.namespace.clone(),
                name: source_key.name.clone(),
                key: config.api_key_key.clone(),
            }
        })?;
        self.apis
            .secrets
            .apply(&build_api_key_secret(&working, &namespace, api_key, config))
            .await?;
        self.apply_git_secret(&working, &namespace).await?;

        let config_map = build_config_map(&working, &namespace)?;
        let checksum = config_checksum(&config_map);
        self.apis.config_maps.apply(&config_map).await?;
        set_condition(
            &mut status.conditions,
            Condition::new(
                conditions::CONFIG_READY,
                true,
                reason::CONFIG_APPLIED,
                format!("Configuration rendered ({} keys)", config_map.data.len()),
                generation,
            ),
        );

        if let Some(pvc) = build_pvc(&working, &namespace, config) {
            self.apis.pvcs.apply(&pvc).await?;
        }
        self.apis
            .service_accounts
            .apply(&build_service_account(&working, &namespace))
            .await?;
        let (workload, _) = self
            .apis
            .workloads
            .apply(&build_workload(&working, &namespace, &checksum, config))
            .await?;
        self.apis
            .services
            .apply(&build_service(&working, &namespace, config))
            .await?;

        let endpoint = naming::service_endpoint(live.name(), &namespace, config.service_port);
        self.register(live, &working, &endpoint, status).await;

        status::summarize(&working, declared_servers, config, status);
        status.endpoint = endpoint;

        if workload.status.available_replicas > 0 {
            if status.state != InstanceState::Running {
                info!(namespace = %namespace, "Instance running");
            }
            status.state = InstanceState::Running;
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::DEPLOYMENT_READY,
                    true,
                    reason::WORKLOAD_AVAILABLE,
                    format!("{} replica(s) available", workload.status.available_replicas),
                    generation,
                ),
            );
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::READY,
                    true,
                    reason::RECONCILED,
                    "Instance is running",
                    generation,
                ),
            );
            Ok(Action::AwaitChange)
        } else {
            status.state = InstanceState::Pending;
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::DEPLOYMENT_READY,
                    false,
                    reason::WORKLOAD_NOT_READY,
                    "No replicas available yet",
                    generation,
                ),
            );
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::READY,
                    false,
                    reason::PROGRESSING,
                    "Waiting for the workload to become available",
                    generation,
                ),
            );
            Ok(Action::Requeue(config.readiness_requeue()))
        }
    }

    /// Copy the workspace git credential from the instance's namespace
    async fn apply_git_secret(&self, working: &Instance, namespace: &str) -> Result<()> {
        let Some(git_secret) = working
            .spec
            .workspace
            .as_ref()
            .and_then(|w| w.git_secret())
        else {
            return Ok(());
        };
        let source_key = ObjectKey::new(&working.metadata.namespace, &git_secret.name);
        let source = self.apis.secrets.get_opt(&source_key).await?.ok_or_else(|| {
            ReconcileError::SecretNotFound {
                namespace: source_key.namespace.clone(),
                name: source_key.name.clone(),
            }
        })?;
        let (_, result) = self
            .apis
            .secrets
            .apply(&build_git_secret_copy(working, namespace, &source))
            .await?;
        debug!(secret = %source_key, ?result, "Applied git credential");
        Ok(())
    }

    /// Best-effort tool-directory registration
    async fn register(
        &self,
        live: &Instance,
        working: &Instance,
        endpoint: &str,
        status: &mut InstanceStatus,
    ) {
        let generation = live.metadata.generation;
        let registration = build_registration(working, endpoint, &self.config);
        match self.apis.registrations.apply(&registration).await {
            Ok(_) => {
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        conditions::MCP_SERVER_READY,
                        true,
                        reason::REGISTERED,
                        format!("Registered as {}", registration.key()),
                        generation,
                    ),
                );
            }
            Err(e) => {
                warn!(error = %e, "Tool directory registration failed");
                let message = format!("registration {} failed: {e}", registration.key());
                self.events
                    .warning(
                        Kind::Instance,
                        &live.key(),
                        reason::REGISTRATION_FAILED,
                        message.clone(),
                    )
                    .await;
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        conditions::MCP_SERVER_READY,
                        false,
                        reason::REGISTRATION_FAILED,
                        message,
                        generation,
                    ),
                );
            }
        }
    }

    async fn record_failure(
        &self,
        live: &Instance,
        status: &mut InstanceStatus,
        err: &ReconcileError,
    ) {
        let key = live.key();
        warn!(error = %err, reason = err.reason(), class = ?err.retry_class(), "Reconcile failed");
        self.events
            .warning(Kind::Instance, &key, err.reason(), err.to_string())
            .await;

        status.state = InstanceState::Error;
        set_condition(
            &mut status.conditions,
            Condition::new(
                conditions::READY,
                false,
                err.reason(),
                err.to_string(),
                live.metadata.generation,
            ),
        );
        if let Err(e) = self.write_status(&key, status).await {
            warn!(error = %e, "Failed to record error status");
        }
    }

    /// Write `status` onto the latest stored version of the instance
    pub(crate) async fn write_status(
        &self,
        key: &ObjectKey,
        status: &InstanceStatus,
    ) -> Result<()> {
        self.apis
            .instances
            .patch_status(key, |instance| instance.status = status.clone())
            .await?;
        Ok(())
    }
}

fn selects_template(instance: &Instance, name: &str) -> bool {
    matches!(&instance.spec.personality, Some(TemplateSelector::Named(n)) if n == name)
}

impl InstanceReconciler {
    async fn instances_where<F>(&self, predicate: F) -> Vec<ObjectKey>
    where
        F: Fn(&Instance) -> bool,
    {
        match self.apis.instances.list(None, &BTreeMap::new()).await {
            Ok(instances) => instances
                .iter()
                .filter(|i| predicate(i))
                .map(Resource::key)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list instances for event mapping");
                Vec::new()
            }
        }
    }

    /// Instances whose shared servers bind `secret`
    async fn instances_using_secret(&self, secret: &str) -> Vec<ObjectKey> {
        let servers = Api::<McpServer>::new(self.store.clone());
        let using: Vec<String> = match servers
            .list(Some(&self.config.operator_namespace), &BTreeMap::new())
            .await
        {
            Ok(servers) => servers
                .into_iter()
                .filter(|s| s.spec.secret_names().any(|n| n == secret))
                .map(|s| s.metadata.name)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list MCP servers for event mapping");
                return Vec::new();
            }
        };
        if using.is_empty() {
            return Vec::new();
        }
        self.instances_where(|i| i.mcp_server_refs().any(|r| using.iter().any(|u| u == r)))
            .await
    }
}

#[async_trait]
impl Reconcile for InstanceReconciler {
    fn name(&self) -> &'static str {
        "instance"
    }

    async fn list_keys(&self) -> Result<Vec<ObjectKey>> {
        Ok(self
            .apis
            .instances
            .list(None, &BTreeMap::new())
            .await?
            .iter()
            .map(Resource::key)
            .collect())
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        InstanceReconciler::reconcile(self, key).await
    }

    async fn map_event(&self, event: &WatchEvent) -> Vec<ObjectKey> {
        let key = event.key();
        let operator_ns = self.config.operator_namespace.as_str();
        match event.kind() {
            Kind::Instance => vec![key],
            Kind::Personality => {
                self.instances_where(|i| {
                    i.metadata.namespace == key.namespace && selects_template(i, &key.name)
                })
                .await
            }
            Kind::McpServer if key.namespace == operator_ns => {
                self.instances_where(|i| i.mcp_server_refs().any(|r| r == key.name))
                    .await
            }
            Kind::Secret if key.namespace == operator_ns => {
                if key.name == self.config.api_key_secret {
                    self.instances_where(|_| true).await
                } else {
                    self.instances_using_secret(&key.name).await
                }
            }
            Kind::Namespace => Vec::new(),
            _ => {
                // Dependents carry the instance name and owner as labels
                let labels = &event.object.metadata.labels;
                let (Some(name), Some(owner)) =
                    (labels.get(LABEL_INSTANCE), labels.get(LABEL_OWNER))
                else {
                    return Vec::new();
                };
                self.instances_where(|i| {
                    i.metadata.name == *name && sanitize_label_value(&i.spec.owner) == *owner
                })
                .await
            }
        }
    }
}
