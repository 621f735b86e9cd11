//! Naming and labelling conventions
//!
//! Creation and teardown derive every name from here so that deletion can
//! find resources without re-running resolution.

use std::collections::BTreeMap;

pub const MANAGED_BY: &str = "warden";
pub const FINALIZER: &str = "warden.dev/finalizer";

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_OWNER: &str = "warden.dev/owner";

pub const APP_NAME: &str = "warden-instance";
pub const COMPONENT_MCP_SECRET: &str = "mcp-secret";

/// Annotation carrying the rendered config checksum
pub const CONFIG_CHECKSUM_ANNOTATION: &str = "warden.dev/config-checksum";

pub const USER_NAMESPACE_PREFIX: &str = "warden-user-";

const MAX_NAMESPACE_SUFFIX: usize = 50;
const MAX_LABEL_VALUE: usize = 63;

/// Lower-case, map anything outside `[a-z0-9-]` to `-`, trim dashes
fn sanitize(value: &str, max_len: usize) -> String {
    let mapped: String = value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('-');
    let truncated: String = trimmed.chars().take(max_len).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Tenant namespace for an owner identity
pub fn user_namespace(owner: &str) -> String {
    let suffix = sanitize(owner, MAX_NAMESPACE_SUFFIX);
    if suffix.is_empty() {
        return format!("{USER_NAMESPACE_PREFIX}unknown");
    }
    format!("{USER_NAMESPACE_PREFIX}{suffix}")
}

pub fn sanitize_label_value(value: &str) -> String {
    sanitize(value, MAX_LABEL_VALUE)
}

/// Labels applied to every object created for one instance
pub fn instance_labels(instance_name: &str, owner: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), APP_NAME.to_string()),
        (LABEL_INSTANCE.to_string(), instance_name.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_OWNER.to_string(), sanitize_label_value(owner)),
    ])
}

/// Owner-scoped labels for copied shared credentials.
///
/// No instance label: several instances of one owner share a copy.
pub fn mcp_secret_labels(owner: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_COMPONENT.to_string(), COMPONENT_MCP_SECRET.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_OWNER.to_string(), sanitize_label_value(owner)),
    ])
}

pub fn config_map_name(instance: &str) -> String {
    format!("{instance}-config")
}

pub fn pvc_name(instance: &str) -> String {
    format!("{instance}-workspace")
}

pub fn api_key_secret_name(instance: &str) -> String {
    format!("{instance}-api-key")
}

pub fn git_secret_name(instance: &str) -> String {
    format!("{instance}-git-creds")
}

pub fn service_account_name(instance: &str) -> String {
    instance.to_string()
}

pub fn workload_name(instance: &str) -> String {
    instance.to_string()
}

pub fn service_name(instance: &str) -> String {
    instance.to_string()
}

pub fn registration_name(instance: &str) -> String {
    format!("warden-{instance}")
}

/// Cluster-local endpoint of an instance's service
pub fn service_endpoint(instance: &str, namespace: &str, port: u16) -> String {
    format!("http://{instance}.{namespace}.svc.cluster.local:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_namespace_sanitizes_email() {
        assert_eq!(user_namespace("Alice.Smith@Example.com"), "warden-user-alice-smith-example-com");
        assert_eq!(user_namespace("@@@"), "warden-user-unknown");
    }

    #[test]
    fn test_user_namespace_truncates() {
        let owner = "a".repeat(80);
        let ns = user_namespace(&owner);
        assert_eq!(ns.len(), USER_NAMESPACE_PREFIX.len() + 50);
    }

    #[test]
    fn test_truncation_never_ends_with_dash() {
        let owner = format!("{}.{}", "a".repeat(49), "b".repeat(10));
        assert_eq!(user_namespace(&owner), format!("warden-user-{}", "a".repeat(49)));
    }

    #[test]
    fn test_secret_labels_have_no_instance() {
        let labels = mcp_secret_labels("bob");
        assert!(!labels.contains_key(LABEL_INSTANCE));
        assert_eq!(labels[LABEL_COMPONENT], COMPONENT_MCP_SECRET);
        assert_eq!(instance_labels("a", "bob")[LABEL_INSTANCE], "a");
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            service_endpoint("a", "warden-user-bob", 8080),
            "http://a.warden-user-bob.svc.cluster.local:8080"
        );
    }
}
