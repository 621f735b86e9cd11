//! Agent instances

use crate::bundle::ConfigBundle;
use crate::condition::Condition;
use crate::impl_resource;
use crate::meta::{Kind, ObjectMeta};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which template an instance inherits from.
///
/// Exactly one resolution path is taken per selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateSelector {
    /// A Personality object in the instance's namespace
    #[serde(rename = "name")]
    Named(String),
    /// A remote artifact reference (`repo:tag` or `repo@sha256:...`)
    #[serde(rename = "artifact")]
    Artifact(String),
}

impl TemplateSelector {
    /// The name or reference string, as shown in status
    pub fn display_name(&self) -> &str {
        match self {
            TemplateSelector::Named(name) => name,
            TemplateSelector::Artifact(reference) => reference,
        }
    }
}

impl fmt::Display for TemplateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Persistent workspace storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Requested size; 5Gi when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Repository cloned into the workspace before the agent starts
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_repo: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_ref: String,

    /// SSH credential for `git_repo`, read from the instance's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_secret_ref: Option<GitSecretReference>,
}

impl WorkspaceConfig {
    pub fn needs_git_clone(&self) -> bool {
        !self.git_repo.is_empty()
    }

    /// The credential reference, only when there is something to clone
    pub fn git_secret(&self) -> Option<&GitSecretReference> {
        self.git_secret_ref
            .as_ref()
            .filter(|_| self.needs_git_clone())
    }
}

/// Secret holding a git SSH private key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSecretReference {
    pub name: String,

    /// Data key of the private key; `ssh-privatekey` when unset
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

impl GitSecretReference {
    pub const DEFAULT_KEY: &'static str = "ssh-privatekey";

    pub fn key_or_default(&self) -> &str {
        if self.key.is_empty() {
            Self::DEFAULT_KEY
        } else {
            &self.key
        }
    }
}

/// External tool-directory registration settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Identity of the user who owns the instance
    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<TemplateSelector>,

    #[serde(flatten)]
    pub bundle: ConfigBundle,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationConfig>,
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    #[default]
    #[serde(rename = "")]
    New,
    Pending,
    Running,
    Error,
    Deleting,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::New => "",
            InstanceState::Pending => "Pending",
            InstanceState::Running => "Running",
            InstanceState::Error => "Error",
            InstanceState::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceMode {
    #[default]
    #[serde(rename = "persistent")]
    Persistent,
    #[serde(rename = "single-shot")]
    SingleShot,
}

impl InstanceMode {
    /// Persistent unless explicitly turned off
    pub fn from_flag(persistent: Option<bool>) -> Self {
        match persistent {
            Some(false) => InstanceMode::SingleShot,
            _ => InstanceMode::Persistent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub state: InstanceState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    #[serde(default)]
    pub mode: InstanceMode,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub personality: String,

    /// Resolved image when it differs from the default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub toolchain: String,

    #[serde(default)]
    pub plugin_count: u32,

    #[serde(default)]
    pub mcp_server_count: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub observed_generation: i64,
}

/// A user-declared agent workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,
    #[serde(default)]
    pub status: InstanceStatus,
}

impl_resource!(Instance, Kind::Instance);

impl Instance {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: InstanceSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: InstanceStatus::default(),
        }
    }

    /// Names of the shared integrations this instance references
    pub fn mcp_server_refs(&self) -> impl Iterator<Item = &str> {
        self.spec.bundle.mcp_servers.iter().map(|r| r.name.as_str())
    }
}
