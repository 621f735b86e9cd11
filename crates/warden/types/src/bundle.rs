//! The configuration bundle shared by instances and personalities
//!
//! An Instance and a Personality carry the same bundle; the instance adds
//! the fields that only make sense for one running workload (owner, storage,
//! network registration). Maps are ordered so that serializing the same
//! bundle twice yields identical bytes.

use crate::mcp_server::ToolConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque JSON payload passed through without interpretation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig(pub serde_json::Value);

impl RawConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Single-line JSON rendering
    pub fn to_compact_string(&self) -> String {
        self.0.to_string()
    }
}

impl From<serde_json::Value> for RawConfig {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Agent runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub permission_mode: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub append_system_prompt: String,

    /// Inline tool integrations, keyed by server name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, ToolConfig>,

    /// Credential bindings for `${VAR}` expansion in tool configs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_server_secrets: Vec<CredentialSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_timeout: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mcp_output_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_mcp_config: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub effort: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fallback_model: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json_schema: String,

    /// Custom settings file path; conflicts with inline hooks
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub settings_file: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub setting_sources: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,

    /// JSON-format subagent definitions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agents: BTreeMap<String, RawConfig>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub active_agent: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_mode: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_partial_messages: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_session_persistence: Option<bool>,
}

impl AgentConfig {
    pub fn is_empty(&self) -> bool {
        *self == AgentConfig::default()
    }
}

/// Maps environment variable names to keys of one secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSource {
    pub secret_name: String,

    /// Environment variable name -> secret key
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CredentialSource {
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, var: impl Into<String>, key: impl Into<String>) -> Self {
        self.env.insert(var.into(), key.into());
        self
    }
}

/// Plugin image reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReference {
    pub repository: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

impl PluginReference {
    pub fn tagged(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            digest: String::new(),
        }
    }

    /// Last path segment of the repository
    pub fn short_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(self.repository.as_str())
    }

    /// Full pullable image reference
    pub fn image_reference(&self) -> String {
        if self.digest.is_empty() {
            format!("{}:{}", self.repository, self.tag)
        } else {
            format!("{}@{}", self.repository, self.digest)
        }
    }
}

/// Reference to a shared McpServer by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerReference {
    pub name: String,
}

impl McpServerReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Inline skill rendered as SKILL.md with frontmatter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_model_invocation: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_invocable: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub allowed_tools: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RawConfig>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub argument_hint: String,
}

/// Inline markdown subagent definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFileConfig {
    pub content: String,
}

/// Compute resource requirements, quantities kept as strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Telemetry export settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metrics_exporter: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logs_exporter: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp: Option<OtlpConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_export_interval_ms: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_export_interval_ms: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_user_prompts: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_tool_details: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_attributes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtlpConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub headers: String,
}

/// Configuration layer shared by instances and personalities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBundle {
    /// Container image override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(default, skip_serializing_if = "AgentConfig::is_empty")]
    pub agent: AgentConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_dirs: Vec<String>,

    /// Shared integrations referenced by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_servers: Vec<McpServerReference>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub skills: BTreeMap<String, SkillConfig>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_files: BTreeMap<String, AgentFileConfig>,

    /// Lifecycle hooks rendered to settings.json
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, RawConfig>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hook_scripts: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_dirs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_additional_dirs_memory: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetryConfig>,

    /// Free-text persona document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub soul: String,
}

impl ConfigBundle {
    /// Total number of tool integrations, referenced plus inline
    pub fn mcp_server_count(&self) -> usize {
        self.mcp_servers.len() + self.agent.mcp_servers.len()
    }
}
