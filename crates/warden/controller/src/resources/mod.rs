//! Infrastructure builders
//!
//! Pure functions from a fully merged instance to the desired state of each
//! dependent object. The reconciler only calls these and upserts the result.

mod config_map;
mod workload;

pub use config_map::{build_config_map, config_checksum, render_skill};
pub use workload::{build_env, build_workload};

use crate::config::ControllerConfig;
use std::collections::BTreeMap;
use warden_types::naming::{
    self, instance_labels, mcp_secret_labels, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME,
    LABEL_OWNER, MANAGED_BY,
};
use warden_types::{
    Instance, Namespace, ObjectMeta, PersistentVolumeClaim, PvcSpec, RegistrationSpec, Resource,
    Secret, Service, ServiceAccount, ServiceSpec, ToolRegistration,
};

pub const CONFIG_VOLUME: &str = "config";
pub const WORKSPACE_VOLUME: &str = "workspace";
pub const CONFIG_MOUNT_PATH: &str = "/etc/warden";
pub const MCP_CONFIG_PATH: &str = "/etc/warden/mcp-config.json";
pub const SETTINGS_FILE_PATH: &str = "/etc/warden/settings.json";
pub const SOUL_PATH: &str = "/etc/warden/SOUL.md";
pub const EXTENSIONS_PATH: &str = "/etc/warden/extensions";
pub const HOOK_SCRIPTS_PATH: &str = "/etc/warden/hooks";
pub const PLUGIN_BASE_PATH: &str = "/var/lib/warden/plugins";
pub const WORKSPACE_MOUNT_PATH: &str = "/workspace";
pub const GIT_SECRET_VOLUME: &str = "git-secret";
pub const GIT_SECRET_MOUNT_PATH: &str = "/etc/git-secret";

/// Transport advertised to the tool directory
pub const REGISTRATION_TRANSPORT: &str = "streamable-http";

fn meta(namespace: &str, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        labels,
        ..ObjectMeta::new(namespace, name)
    }
}

/// Tenant namespace for the instance's owner
pub fn build_namespace(owner: &str) -> Namespace {
    let labels = BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_OWNER.to_string(), naming::sanitize_label_value(owner)),
    ]);
    Namespace {
        metadata: meta("", naming::user_namespace(owner), labels),
    }
}

/// Per-instance copy of the org-wide API key value
pub fn build_api_key_secret(
    instance: &Instance,
    namespace: &str,
    api_key: &[u8],
    config: &ControllerConfig,
) -> Secret {
    let name = instance.name();
    let mut secret = Secret::new(namespace, naming::api_key_secret_name(name))
        .with_entry(config.api_key_key.clone(), api_key.to_vec());
    secret.metadata.labels = instance_labels(name, &instance.spec.owner);
    secret
}

/// Per-instance copy of the workspace git credential
pub fn build_git_secret_copy(instance: &Instance, namespace: &str, source: &Secret) -> Secret {
    let name = instance.name();
    let mut secret = Secret::new(namespace, naming::git_secret_name(name));
    secret.type_ = source.type_.clone();
    secret.data = source.data.clone();
    secret.metadata.labels = instance_labels(name, &instance.spec.owner);
    secret
}

/// Owner-scoped copy of a shared integration's secret
pub fn build_mcp_secret_copy(source: &Secret, namespace: &str, owner: &str) -> Secret {
    let mut secret = Secret::new(namespace, source.name());
    secret.type_ = source.type_.clone();
    secret.data = source.data.clone();
    secret.metadata.labels = mcp_secret_labels(owner);
    secret
}

/// Workspace claim, only when the instance asks for storage
pub fn build_pvc(
    instance: &Instance,
    namespace: &str,
    config: &ControllerConfig,
) -> Option<PersistentVolumeClaim> {
    let workspace = instance.spec.workspace.as_ref()?;
    let name = instance.name();
    Some(PersistentVolumeClaim {
        metadata: meta(
            namespace,
            naming::pvc_name(name),
            instance_labels(name, &instance.spec.owner),
        ),
        spec: PvcSpec {
            storage_class: workspace.storage_class.clone(),
            size: workspace
                .size
                .clone()
                .unwrap_or_else(|| config.default_workspace_size.clone()),
            access_modes: vec!["ReadWriteOnce".to_string()],
        },
    })
}

pub fn build_service_account(instance: &Instance, namespace: &str) -> ServiceAccount {
    let name = instance.name();
    ServiceAccount {
        metadata: meta(
            namespace,
            naming::service_account_name(name),
            instance_labels(name, &instance.spec.owner),
        ),
    }
}

pub fn build_service(instance: &Instance, namespace: &str, config: &ControllerConfig) -> Service {
    let name = instance.name();
    Service {
        metadata: meta(
            namespace,
            naming::service_name(name),
            instance_labels(name, &instance.spec.owner),
        ),
        spec: ServiceSpec {
            port: config.service_port,
            selector: BTreeMap::from([
                (LABEL_NAME.to_string(), naming::APP_NAME.to_string()),
                (LABEL_INSTANCE.to_string(), name.to_string()),
            ]),
        },
    }
}

/// Namespace the instance registers into
pub fn registration_namespace(instance: &Instance, config: &ControllerConfig) -> String {
    instance
        .spec
        .registration
        .as_ref()
        .map(|r| r.namespace.clone())
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| config.registration_namespace.clone())
}

/// Entry in the external tool directory pointing at the instance endpoint
pub fn build_registration(
    instance: &Instance,
    endpoint: &str,
    config: &ControllerConfig,
) -> ToolRegistration {
    let name = instance.name();
    let tool_prefix = instance
        .spec
        .registration
        .as_ref()
        .map(|r| r.tool_prefix.clone())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| name.to_string());
    ToolRegistration {
        metadata: meta(
            &registration_namespace(instance, config),
            naming::registration_name(name),
            instance_labels(name, &instance.spec.owner),
        ),
        spec: RegistrationSpec {
            transport: REGISTRATION_TRANSPORT.to_string(),
            url: format!("{endpoint}/mcp"),
            tool_prefix,
            forward_token: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{InstanceSpec, RegistrationConfig, WorkspaceConfig};

    fn instance() -> Instance {
        Instance::new(
            "team",
            "reviewer",
            InstanceSpec {
                owner: "alice@example.com".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_namespace_derived_from_owner() {
        let ns = build_namespace("alice@example.com");
        assert_eq!(ns.metadata.name, "warden-user-alice-example-com");
        assert_eq!(ns.metadata.labels[LABEL_MANAGED_BY], MANAGED_BY);
    }

    #[test]
    fn test_pvc_only_with_workspace() {
        let config = ControllerConfig::default();
        assert!(build_pvc(&instance(), "ns", &config).is_none());

        let mut with_storage = instance();
        with_storage.spec.workspace = Some(WorkspaceConfig::default());
        let pvc = build_pvc(&with_storage, "ns", &config).unwrap();
        assert_eq!(pvc.metadata.name, "reviewer-workspace");
        assert_eq!(pvc.spec.size, "5Gi");
    }

    #[test]
    fn test_registration_defaults() {
        let config = ControllerConfig::default();
        let reg = build_registration(
            &instance(),
            "http://reviewer.ns.svc.cluster.local:8080",
            &config,
        );
        assert_eq!(reg.metadata.namespace, "muster");
        assert_eq!(reg.metadata.name, "warden-reviewer");
        assert_eq!(reg.spec.url, "http://reviewer.ns.svc.cluster.local:8080/mcp");
        assert_eq!(reg.spec.tool_prefix, "reviewer");

        let mut custom = instance();
        custom.spec.registration = Some(RegistrationConfig {
            namespace: "tools".into(),
            tool_prefix: "rv".into(),
        });
        let reg = build_registration(&custom, "http://x", &config);
        assert_eq!(reg.metadata.namespace, "tools");
        assert_eq!(reg.spec.tool_prefix, "rv");
    }

    #[test]
    fn test_api_key_copy_carries_only_the_key() {
        let config = ControllerConfig::default();
        let secret = build_api_key_secret(&instance(), "ns", b"sk-1", &config);
        assert_eq!(secret.metadata.name, "reviewer-api-key");
        assert_eq!(secret.data.len(), 1);
        assert_eq!(secret.data[&config.api_key_key], b"sk-1".to_vec());
        assert_eq!(secret.metadata.labels[LABEL_INSTANCE], "reviewer");
    }

    #[test]
    fn test_git_secret_copy_is_instance_scoped() {
        let mut source = Secret::new("team", "deploy-key").with_entry("ssh-privatekey", "k");
        source.type_ = "kubernetes.io/ssh-auth".into();
        let copy = build_git_secret_copy(&instance(), "warden-user-alice", &source);
        assert_eq!(copy.metadata.name, "reviewer-git-creds");
        assert_eq!(copy.type_, "kubernetes.io/ssh-auth");
        assert_eq!(copy.data["ssh-privatekey"], b"k".to_vec());
        assert_eq!(copy.metadata.labels[LABEL_INSTANCE], "reviewer");
    }

    #[test]
    fn test_mcp_secret_copy_is_owner_scoped() {
        let source = Secret::new("warden-system", "gh-token").with_entry("token", "abc");
        let copy = build_mcp_secret_copy(&source, "warden-user-bob", "bob");
        assert_eq!(copy.metadata.namespace, "warden-user-bob");
        assert_eq!(copy.data["token"], b"abc".to_vec());
        assert!(!copy.metadata.labels.contains_key(LABEL_INSTANCE));
    }
}
