//! Controller configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the instance, personality and MCP server controllers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Namespace holding shared MCP servers, their secrets and the API key
    #[serde(default = "default_operator_namespace")]
    pub operator_namespace: String,

    /// Agent image used when neither instance nor template sets one
    #[serde(default = "default_image")]
    pub default_image: String,

    /// Org-wide API key secret copied into every tenant namespace
    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,

    /// Key inside the API key secret
    #[serde(default = "default_api_key_key")]
    pub api_key_key: String,

    /// Image of the init container that clones workspace repositories
    #[serde(default = "default_git_clone_image")]
    pub git_clone_image: String,

    /// Namespace of the external tool directory
    #[serde(default = "default_registration_namespace")]
    pub registration_namespace: String,

    /// Concurrent reconcile workers per controller
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Requeue delay while the workload has no available replicas
    #[serde(default = "default_readiness_requeue")]
    pub readiness_requeue_secs: u64,

    /// Requeue delay while the API key secret is missing
    #[serde(default = "default_api_key_requeue")]
    pub api_key_requeue_secs: u64,

    /// First error backoff step
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Full relist of every key, catching missed watch events
    #[serde(default = "default_resync")]
    pub resync_secs: u64,

    /// Error backoff ceiling
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Port the agent serves on
    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Workspace claim size when none is requested
    #[serde(default = "default_workspace_size")]
    pub default_workspace_size: String,
}

fn default_operator_namespace() -> String {
    "warden-system".to_string()
}

fn default_image() -> String {
    "ghcr.io/warden-dev/agent:latest".to_string()
}

fn default_api_key_secret() -> String {
    "agent-api-key".to_string()
}

fn default_api_key_key() -> String {
    "api-key".to_string()
}

fn default_git_clone_image() -> String {
    "alpine/git:2.47.2".to_string()
}

fn default_registration_namespace() -> String {
    "muster".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_readiness_requeue() -> u64 {
    5
}

fn default_api_key_requeue() -> u64 {
    30
}

fn default_backoff_base() -> u64 {
    500
}

fn default_resync() -> u64 {
    300
}

fn default_backoff_max() -> u64 {
    300
}

fn default_service_port() -> u16 {
    8080
}

fn default_workspace_size() -> String {
    "5Gi".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            operator_namespace: default_operator_namespace(),
            default_image: default_image(),
            api_key_secret: default_api_key_secret(),
            api_key_key: default_api_key_key(),
            git_clone_image: default_git_clone_image(),
            registration_namespace: default_registration_namespace(),
            workers: default_workers(),
            readiness_requeue_secs: default_readiness_requeue(),
            api_key_requeue_secs: default_api_key_requeue(),
            backoff_base_ms: default_backoff_base(),
            resync_secs: default_resync(),
            backoff_max_secs: default_backoff_max(),
            service_port: default_service_port(),
            default_workspace_size: default_workspace_size(),
        }
    }
}

impl ControllerConfig {
    pub fn readiness_requeue(&self) -> Duration {
        Duration::from_secs(self.readiness_requeue_secs)
    }

    pub fn api_key_requeue(&self) -> Duration {
        Duration::from_secs(self.api_key_requeue_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.readiness_requeue(), Duration::from_secs(5));
        assert_eq!(config.api_key_requeue(), Duration::from_secs(30));
        assert_eq!(config.registration_namespace, "muster");
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"workers": 8, "operator_namespace": "ops"}"#).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.operator_namespace, "ops");
        assert_eq!(config.service_port, 8080);
    }
}
