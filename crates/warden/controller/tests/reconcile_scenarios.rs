//! End-to-end reconcile passes against the in-memory store

use std::collections::BTreeMap;
use std::sync::Arc;
use warden_controller::conditions::{self, reason};
use warden_controller::{
    Action, ControllerConfig, EventRecorder, InstanceReconciler, ReconcileError, RetryClass,
};
use warden_store::{Api, InMemoryStore, ObjectStore, StoreOp};
use warden_template::{pack, ArtifactCache, InMemoryTransport};
use warden_types::naming::{self, user_namespace, FINALIZER};
use warden_types::{
    find_condition, set_condition, Condition, ConditionStatus, ConfigMap, CredentialSource,
    EnvSource, GitSecretReference, Instance, InstanceSpec, InstanceState, Kind, McpServer,
    McpServerConfig, McpServerReference, McpServerSpec, ObjectKey, Personality, PersonalitySpec,
    PluginReference, Secret, TemplateSelector, ToolConfig, Workload, WorkspaceConfig,
};

// ============================================================================
// Helpers
// ============================================================================

const TEAM: &str = "team";
const OPS: &str = "warden-system";

struct Harness {
    store: InMemoryStore,
    transport: Arc<InMemoryTransport>,
    events: EventRecorder,
    reconciler: InstanceReconciler,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let transport = Arc::new(InMemoryTransport::new());
        let events = EventRecorder::new();
        let reconciler = InstanceReconciler::new(
            Arc::new(store.clone()),
            transport.clone(),
            ArtifactCache::new(),
            events.clone(),
            ControllerConfig::default(),
        );
        Self {
            store,
            transport,
            events,
            reconciler,
        }
    }

    fn api<K: warden_types::Resource>(&self) -> Api<K> {
        let store: Arc<dyn ObjectStore> = Arc::new(self.store.clone());
        Api::new(store)
    }

    async fn with_api_key(self) -> Self {
        let secret = Secret::new(OPS, "agent-api-key").with_entry("api-key", "sk-test");
        self.api::<Secret>().create(&secret).await.unwrap();
        self
    }

    async fn create_instance(&self, name: &str, spec: InstanceSpec) -> ObjectKey {
        let instance = Instance::new(TEAM, name, spec);
        self.api::<Instance>().create(&instance).await.unwrap();
        ObjectKey::new(TEAM, name)
    }

    async fn instance(&self, key: &ObjectKey) -> Instance {
        self.api::<Instance>().get(key).await.unwrap()
    }

    async fn workload(&self, owner: &str, name: &str) -> Workload {
        self.api::<Workload>()
            .get(&ObjectKey::new(user_namespace(owner), name))
            .await
            .unwrap()
    }

    async fn mark_available(&self, owner: &str, name: &str) {
        let workloads = self.api::<Workload>();
        workloads
            .patch_status(&ObjectKey::new(user_namespace(owner), name), |w| {
                w.status.available_replicas = 1
            })
            .await
            .unwrap();
    }

    async fn shared_server(&self, name: &str, secrets: &[(&str, &str, &str)]) {
        let spec = McpServerSpec {
            transport: "streamable-http".into(),
            url: format!("https://{name}.example.com/mcp"),
            secret_refs: secrets
                .iter()
                .map(|(secret, var, key)| CredentialSource::new(*secret).with_env(*var, *key))
                .collect(),
            ..Default::default()
        };
        self.api::<McpServer>()
            .create(&McpServer::new(OPS, name, spec))
            .await
            .unwrap();
        for (secret, _, key) in secrets {
            let source = Secret::new(OPS, *secret).with_entry(*key, "token");
            let _ = self.api::<Secret>().create(&source).await;
        }
    }

    async fn mark_server_not_ready(&self, name: &str, message: &str) {
        self.api::<McpServer>()
            .patch_status(&ObjectKey::new(OPS, name), |server| {
                set_condition(
                    &mut server.status.conditions,
                    Condition::new(conditions::READY, false, "InvalidSpec", message, 1),
                );
            })
            .await
            .unwrap();
    }

    async fn config_data(&self, owner: &str, name: &str) -> BTreeMap<String, String> {
        self.api::<ConfigMap>()
            .get(&ObjectKey::new(user_namespace(owner), format!("{name}-config")))
            .await
            .unwrap()
            .data
    }

    async fn tenant_secret_names(&self, owner: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .api::<Secret>()
            .list(Some(&user_namespace(owner)), &BTreeMap::new())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.metadata.name)
            .collect();
        names.sort();
        names
    }
}

fn owned_by(owner: &str) -> InstanceSpec {
    InstanceSpec {
        owner: owner.into(),
        ..Default::default()
    }
}

fn env_value(workload: &Workload, name: &str) -> Option<String> {
    workload
        .spec
        .env
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

fn env_secret(workload: &Workload, name: &str) -> Option<(String, String)> {
    workload
        .spec
        .env
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| match &e.value_from {
            Some(EnvSource::SecretKey { name, key }) => Some((name.clone(), key.clone())),
            _ => None,
        })
}

fn ready_reason(instance: &Instance) -> String {
    find_condition(&instance.status.conditions, conditions::READY)
        .map(|c| c.reason.clone())
        .unwrap_or_default()
}

// ============================================================================
// Template inheritance
// ============================================================================

#[tokio::test]
async fn test_instance_inherits_template_model() {
    let h = Harness::new().with_api_key().await;
    let mut template = PersonalitySpec::default();
    template.bundle.agent.model = "opus".into();
    template.bundle.plugins = vec![PluginReference::tagged("ghcr.io/acme/lint", "v1")];
    h.api::<Personality>()
        .create(&Personality::new(TEAM, "reviewer", template))
        .await
        .unwrap();

    let mut spec = owned_by("alice");
    spec.personality = Some(TemplateSelector::Named("reviewer".into()));
    spec.bundle.plugins = vec![PluginReference::tagged("ghcr.io/acme/fmt", "v2")];
    let key = h.create_instance("a", spec).await;

    h.reconciler.reconcile(&key).await.unwrap();

    let workload = h.workload("alice", "a").await;
    assert_eq!(env_value(&workload, "AGENT_MODEL").as_deref(), Some("opus"));

    let live = h.instance(&key).await;
    assert_eq!(live.status.personality, "reviewer");
    assert_eq!(live.status.plugin_count, 2);
    // The stored spec is never rewritten with merged values
    assert!(live.spec.bundle.agent.model.is_empty());
    assert!(live.metadata.has_finalizer(FINALIZER));
}

#[tokio::test]
async fn test_instance_model_overrides_template() {
    let h = Harness::new().with_api_key().await;
    let mut template = PersonalitySpec::default();
    template.bundle.agent.model = "opus".into();
    template.bundle.agent.max_turns = Some(40);
    h.api::<Personality>()
        .create(&Personality::new(TEAM, "reviewer", template))
        .await
        .unwrap();

    let mut spec = owned_by("alice");
    spec.personality = Some(TemplateSelector::Named("reviewer".into()));
    spec.bundle.agent.model = "haiku".into();
    let key = h.create_instance("a", spec).await;

    h.reconciler.reconcile(&key).await.unwrap();

    let workload = h.workload("alice", "a").await;
    assert_eq!(env_value(&workload, "AGENT_MODEL").as_deref(), Some("haiku"));
    assert_eq!(env_value(&workload, "AGENT_MAX_TURNS").as_deref(), Some("40"));
}

#[tokio::test]
async fn test_artifact_template_is_fetched_and_applied() {
    let h = Harness::new().with_api_key().await;
    let bytes = pack("agent:\n  model: sonnet\n", Some("Be terse.")).unwrap();
    h.transport.publish("ghcr.io/acme/personas/terse:v1", bytes);

    let mut spec = owned_by("alice");
    spec.personality = Some(TemplateSelector::Artifact(
        "ghcr.io/acme/personas/terse:v1".into(),
    ));
    let key = h.create_instance("a", spec).await;

    h.reconciler.reconcile(&key).await.unwrap();

    let workload = h.workload("alice", "a").await;
    assert_eq!(env_value(&workload, "AGENT_MODEL").as_deref(), Some("sonnet"));
    let config = h
        .api::<ConfigMap>()
        .get(&ObjectKey::new(user_namespace("alice"), "a-config"))
        .await
        .unwrap();
    assert_eq!(config.data.get("soul").map(String::as_str), Some("Be terse."));
}

#[tokio::test]
async fn test_missing_template_fails_with_error_state() {
    let h = Harness::new().with_api_key().await;
    let mut spec = owned_by("alice");
    spec.personality = Some(TemplateSelector::Named("ghost".into()));
    let key = h.create_instance("a", spec).await;

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Template(_)));

    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Error);
    assert_eq!(ready_reason(&live), "PersonalityNotFound");
    assert_eq!(h.store.count(Kind::Workload).await, 0);
}

// ============================================================================
// Shared integrations
// ============================================================================

#[tokio::test]
async fn test_shared_credentials_override_inline_bindings() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[("gh-shared", "GITHUB_TOKEN", "token")])
        .await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![McpServerReference::new("github")];
    spec.bundle.agent.mcp_server_secrets =
        vec![CredentialSource::new("my-token").with_env("GITHUB_TOKEN", "pat")];
    let key = h.create_instance("a", spec).await;

    h.reconciler.reconcile(&key).await.unwrap();

    let workload = h.workload("alice", "a").await;
    assert_eq!(
        env_secret(&workload, "GITHUB_TOKEN"),
        Some(("gh-shared".to_string(), "token".to_string()))
    );
    assert!(h
        .tenant_secret_names("alice")
        .await
        .contains(&"gh-shared".to_string()));

    let config = h
        .api::<ConfigMap>()
        .get(&ObjectKey::new(user_namespace("alice"), "a-config"))
        .await
        .unwrap();
    assert!(config.data["mcp-config.json"].contains("https://github.example.com/mcp"));
}

#[tokio::test]
async fn test_secret_collision_copies_nothing() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[("shared-token", "GITHUB_TOKEN", "token")])
        .await;
    h.shared_server("gitlab", &[("shared-token", "GITLAB_TOKEN", "token")])
        .await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![
        McpServerReference::new("github"),
        McpServerReference::new("gitlab"),
    ];
    let key = h.create_instance("a", spec).await;

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::SecretCollision { .. }));
    assert!(h.tenant_secret_names("alice").await.is_empty());
    assert_eq!(h.store.count(Kind::Workload).await, 0);

    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Error);
    assert_eq!(ready_reason(&live), "McpSecretCollision");
}

#[tokio::test]
async fn test_unknown_shared_server_is_reported() {
    let h = Harness::new().with_api_key().await;
    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![McpServerReference::new("nowhere")];
    let key = h.create_instance("a", spec).await;

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::McpServerNotFound { .. }));
    assert_eq!(
        h.events.with_reason("McpServerNotFound").await.len(),
        1,
        "failure should surface as a warning event"
    );
}

#[tokio::test]
async fn test_not_ready_server_fails_before_copying() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[("gh-shared", "GITHUB_TOKEN", "token")])
        .await;
    h.mark_server_not_ready("github", "url is not reachable").await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![McpServerReference::new("github")];
    let key = h.create_instance("a", spec).await;

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::McpServerNotReady { .. }));
    assert_eq!(err.retry_class(), RetryClass::TerminalUntilFixed);
    assert!(h.tenant_secret_names("alice").await.is_empty());
    assert_eq!(h.store.count(Kind::Workload).await, 0);

    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Error);
    assert_eq!(ready_reason(&live), "McpServerNotReady");
}

fn inline_entry(url: &str) -> ToolConfig {
    McpServerConfig {
        transport: "streamable-http".into(),
        url: url.into(),
        ..Default::default()
    }
    .into()
}

#[tokio::test]
async fn test_override_event_only_when_inline_entry_differs() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[]).await;

    let mut same = owned_by("alice");
    same.bundle.mcp_servers = vec![McpServerReference::new("github")];
    same.bundle.agent.mcp_servers.insert(
        "github".into(),
        inline_entry("https://github.example.com/mcp"),
    );
    let key = h.create_instance("a", same).await;
    h.reconciler.reconcile(&key).await.unwrap();
    assert!(h
        .events
        .with_reason(reason::MCP_SERVER_OVERRIDE)
        .await
        .is_empty());

    let mut different = owned_by("alice");
    different.bundle.mcp_servers = vec![McpServerReference::new("github")];
    different
        .bundle
        .agent
        .mcp_servers
        .insert("github".into(), inline_entry("https://self-hosted/mcp"));
    let key = h.create_instance("b", different).await;
    h.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(
        h.events.with_reason(reason::MCP_SERVER_OVERRIDE).await.len(),
        1
    );
    assert!(h
        .config_data("alice", "b")
        .await["mcp-config.json"]
        .contains("https://github.example.com/mcp"));
}

#[tokio::test]
async fn test_repeated_passes_render_identical_output() {
    let h = Harness::new().with_api_key().await;
    h.shared_server(
        "github",
        &[
            ("gh-shared", "GITHUB_TOKEN", "token"),
            ("gh-app", "GITHUB_APP_ID", "app-id"),
        ],
    )
    .await;
    h.shared_server("linear", &[("linear-key", "LINEAR_API_KEY", "key")])
        .await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![
        McpServerReference::new("linear"),
        McpServerReference::new("github"),
    ];
    let key = h.create_instance("a", spec).await;

    h.reconciler.reconcile(&key).await.unwrap();
    let first_config = h.config_data("alice", "a").await;
    let first_env = h.workload("alice", "a").await.spec.env;

    h.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(h.config_data("alice", "a").await, first_config);
    assert_eq!(h.workload("alice", "a").await.spec.env, first_env);
}

#[tokio::test]
async fn test_dropped_reference_copy_removed_on_next_pass() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[("gh-shared", "GITHUB_TOKEN", "token")])
        .await;
    h.shared_server("linear", &[("linear-key", "LINEAR_API_KEY", "key")])
        .await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![
        McpServerReference::new("github"),
        McpServerReference::new("linear"),
    ];
    let key = h.create_instance("a", spec).await;
    h.reconciler.reconcile(&key).await.unwrap();
    assert!(h
        .tenant_secret_names("alice")
        .await
        .contains(&"linear-key".to_string()));

    let mut live = h.instance(&key).await;
    live.spec.bundle.mcp_servers = vec![McpServerReference::new("github")];
    h.api::<Instance>().replace(&live).await.unwrap();
    h.reconciler.reconcile(&key).await.unwrap();

    let names = h.tenant_secret_names("alice").await;
    assert!(names.contains(&"gh-shared".to_string()));
    assert!(!names.contains(&"linear-key".to_string()));
    assert!(names.contains(&naming::api_key_secret_name("a")));
}

#[tokio::test]
async fn test_server_count_includes_inline_entries() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[]).await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![McpServerReference::new("github")];
    spec.bundle
        .agent
        .mcp_servers
        .insert("local".into(), inline_entry("http://localhost:9000/mcp"));
    let key = h.create_instance("a", spec).await;
    h.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(h.instance(&key).await.status.mcp_server_count, 2);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_pending_until_workload_available() {
    let h = Harness::new().with_api_key().await;
    let key = h.create_instance("a", owned_by("alice")).await;

    let action = h.reconciler.reconcile(&key).await.unwrap();
    assert!(matches!(action, Action::Requeue(_)));
    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Pending);
    assert_eq!(
        live.status.endpoint,
        format!("http://a.{}.svc.cluster.local:8080", user_namespace("alice"))
    );

    h.mark_available("alice", "a").await;
    let action = h.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(action, Action::AwaitChange);

    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Running);
    assert_eq!(live.status.observed_generation, live.metadata.generation);
    let deployment = find_condition(&live.status.conditions, conditions::DEPLOYMENT_READY).unwrap();
    assert_eq!(deployment.status, ConditionStatus::True);
}

#[tokio::test]
async fn test_missing_api_key_waits() {
    let h = Harness::new();
    let key = h.create_instance("a", owned_by("alice")).await;

    let action = h.reconciler.reconcile(&key).await.unwrap();
    assert!(matches!(action, Action::Requeue(_)));

    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Pending);
    assert_eq!(ready_reason(&live), reason::API_KEY_MISSING);
    assert_eq!(h.store.count(Kind::Workload).await, 0);
}

#[tokio::test]
async fn test_api_key_secret_without_expected_entry_fails() {
    let h = Harness::new();
    let secret = Secret::new(OPS, "agent-api-key").with_entry("wrong-field", "sk-test");
    h.api::<Secret>().create(&secret).await.unwrap();
    let key = h.create_instance("a", owned_by("alice")).await;

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::SecretKeyMissing { ref key, .. } if key == "api-key"));
    assert_eq!(err.retry_class(), RetryClass::Retryable);
    assert_eq!(h.store.count(Kind::Workload).await, 0);
    assert!(!h
        .tenant_secret_names("alice")
        .await
        .contains(&naming::api_key_secret_name("a")));
}

fn cloned_workspace(secret: Option<&str>) -> InstanceSpec {
    let mut spec = owned_by("alice");
    spec.workspace = Some(WorkspaceConfig {
        git_repo: "git@github.com:acme/app.git".into(),
        git_ref: "main".into(),
        git_secret_ref: secret.map(|name| GitSecretReference {
            name: name.into(),
            key: String::new(),
        }),
        ..Default::default()
    });
    spec
}

#[tokio::test]
async fn test_git_credential_copied_and_removed() {
    let h = Harness::new().with_api_key().await;
    let deploy_key = Secret::new(TEAM, "deploy-key").with_entry("ssh-privatekey", "PRIVATE");
    h.api::<Secret>().create(&deploy_key).await.unwrap();
    let key = h
        .create_instance("a", cloned_workspace(Some("deploy-key")))
        .await;

    h.reconciler.reconcile(&key).await.unwrap();

    let copy_key = ObjectKey::new(user_namespace("alice"), naming::git_secret_name("a"));
    let copy = h.api::<Secret>().get(&copy_key).await.unwrap();
    assert_eq!(copy.data["ssh-privatekey"], b"PRIVATE".to_vec());

    let workload = h.workload("alice", "a").await;
    assert_eq!(workload.spec.init_containers.len(), 1);
    assert_eq!(workload.spec.init_containers[0].name, "git-clone");

    h.api::<Instance>().delete(&key).await.unwrap();
    h.reconciler.reconcile(&key).await.unwrap();
    assert!(h.api::<Secret>().get_opt(&copy_key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_git_credential_blocks_workload() {
    let h = Harness::new().with_api_key().await;
    let key = h
        .create_instance("a", cloned_workspace(Some("deploy-key")))
        .await;

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::SecretNotFound { ref name, .. } if name == "deploy-key"));
    assert_eq!(h.store.count(Kind::Workload).await, 0);
}

#[tokio::test]
async fn test_registration_failure_does_not_block_running() {
    let h = Harness::new().with_api_key().await;
    h.store
        .inject_fault(StoreOp::Create, Kind::ToolRegistration, None)
        .await;
    let key = h.create_instance("a", owned_by("alice")).await;

    h.reconciler.reconcile(&key).await.unwrap();
    h.mark_available("alice", "a").await;
    h.reconciler.reconcile(&key).await.unwrap();

    let live = h.instance(&key).await;
    assert_eq!(live.status.state, InstanceState::Running);
    let registered = find_condition(&live.status.conditions, conditions::MCP_SERVER_READY).unwrap();
    assert_eq!(registered.status, ConditionStatus::False);
    assert!(!h.events.with_reason(reason::REGISTRATION_FAILED).await.is_empty());
}

#[tokio::test]
async fn test_config_change_rolls_workload() {
    let h = Harness::new().with_api_key().await;
    let mut spec = owned_by("alice");
    spec.bundle.agent.system_prompt = "v1".into();
    let key = h.create_instance("a", spec).await;
    h.reconciler.reconcile(&key).await.unwrap();
    let before = h.workload("alice", "a").await.spec.pod_annotations;

    let mut live = h.instance(&key).await;
    live.spec.bundle.agent.system_prompt = "v2".into();
    h.api::<Instance>().replace(&live).await.unwrap();
    h.reconciler.reconcile(&key).await.unwrap();
    let after = h.workload("alice", "a").await.spec.pod_annotations;

    assert_ne!(before, after);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_delete_removes_dependents_and_finalizer() {
    let h = Harness::new().with_api_key().await;
    let key = h.create_instance("a", owned_by("alice")).await;
    h.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(h.store.count(Kind::Workload).await, 1);

    h.api::<Instance>().delete(&key).await.unwrap();
    // Remove one dependent out of band; teardown treats it as done
    h.api::<ConfigMap>()
        .delete(&ObjectKey::new(user_namespace("alice"), "a-config"))
        .await
        .unwrap();

    h.reconciler.reconcile(&key).await.unwrap();

    assert!(h.api::<Instance>().get_opt(&key).await.unwrap().is_none());
    assert_eq!(h.store.count(Kind::Workload).await, 0);
    assert_eq!(h.store.count(Kind::Service).await, 0);
    assert_eq!(h.store.count(Kind::ToolRegistration).await, 0);
}

#[tokio::test]
async fn test_failed_delete_keeps_finalizer() {
    let h = Harness::new().with_api_key().await;
    let key = h.create_instance("a", owned_by("alice")).await;
    h.reconciler.reconcile(&key).await.unwrap();

    h.store
        .inject_fault(StoreOp::Delete, Kind::Workload, Some("a"))
        .await;
    h.api::<Instance>().delete(&key).await.unwrap();

    let err = h.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::TeardownIncomplete(_)));

    let live = h.instance(&key).await;
    assert!(live.metadata.has_finalizer(FINALIZER));
    assert_eq!(live.status.state, InstanceState::Deleting);

    h.store.clear_faults().await;
    h.reconciler.reconcile(&key).await.unwrap();
    assert!(h.api::<Instance>().get_opt(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shared_copy_outlives_one_of_two_instances() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[("gh-shared", "GITHUB_TOKEN", "token")])
        .await;

    let mut spec = owned_by("alice");
    spec.bundle.mcp_servers = vec![McpServerReference::new("github")];
    let first = h.create_instance("a", spec.clone()).await;
    let second = h.create_instance("b", spec).await;
    h.reconciler.reconcile(&first).await.unwrap();
    h.reconciler.reconcile(&second).await.unwrap();

    h.api::<Instance>().delete(&first).await.unwrap();
    h.reconciler.reconcile(&first).await.unwrap();
    assert!(h
        .tenant_secret_names("alice")
        .await
        .contains(&"gh-shared".to_string()));

    h.api::<Instance>().delete(&second).await.unwrap();
    h.reconciler.reconcile(&second).await.unwrap();
    assert!(!h
        .tenant_secret_names("alice")
        .await
        .contains(&"gh-shared".to_string()));
    assert!(!h
        .tenant_secret_names("alice")
        .await
        .contains(&naming::api_key_secret_name("b")));
}

#[tokio::test]
async fn test_template_inherited_copy_outlives_sibling() {
    let h = Harness::new().with_api_key().await;
    h.shared_server("github", &[("gh-shared", "GITHUB_TOKEN", "token")])
        .await;
    let mut template = PersonalitySpec::default();
    template.bundle.mcp_servers = vec![McpServerReference::new("github")];
    h.api::<Personality>()
        .create(&Personality::new(TEAM, "dev", template))
        .await
        .unwrap();

    let mut direct = owned_by("alice");
    direct.bundle.mcp_servers = vec![McpServerReference::new("github")];
    let first = h.create_instance("a", direct).await;
    let mut inherits = owned_by("alice");
    inherits.personality = Some(TemplateSelector::Named("dev".into()));
    let second = h.create_instance("b", inherits).await;
    h.reconciler.reconcile(&first).await.unwrap();
    h.reconciler.reconcile(&second).await.unwrap();

    h.api::<Instance>().delete(&first).await.unwrap();
    h.reconciler.reconcile(&first).await.unwrap();
    assert!(h
        .tenant_secret_names("alice")
        .await
        .contains(&"gh-shared".to_string()));

    // The survivor's own pass keeps it too
    h.reconciler.reconcile(&second).await.unwrap();
    assert!(h
        .tenant_secret_names("alice")
        .await
        .contains(&"gh-shared".to_string()));
}
