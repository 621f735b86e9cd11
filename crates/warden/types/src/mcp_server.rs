//! Shared tool integration (MCP server) descriptors

use crate::bundle::{CredentialSource, RawConfig};
use crate::condition::Condition;
use crate::impl_resource;
use crate::meta::{Kind, ObjectMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transports that need a `url`
pub const URL_TRANSPORTS: &[&str] = &["streamable-http", "sse", "http"];

/// Transport that needs a `command`
pub const STDIO_TRANSPORT: &str = "stdio";

/// Tool-config payload in the shape the agent runtime reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct McpServerConfig {
    #[serde(rename = "type")]
    pub transport: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// An inline tool-integration entry.
///
/// Entries matching the known shape are typed; anything else is carried
/// through verbatim. Neither variant is ever deep-merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolConfig {
    Known(McpServerConfig),
    Opaque(RawConfig),
}

impl ToolConfig {
    /// JSON value written into the rendered MCP config
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ToolConfig::Known(config) => {
                serde_json::to_value(config).unwrap_or(serde_json::Value::Null)
            }
            ToolConfig::Opaque(raw) => raw.0.clone(),
        }
    }
}

impl From<McpServerConfig> for ToolConfig {
    fn from(config: McpServerConfig) -> Self {
        ToolConfig::Known(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerSpec {
    #[serde(rename = "type", default)]
    pub transport: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Credentials injected into the agent's environment, never part of
    /// the tool-config payload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<CredentialSource>,
}

impl McpServerSpec {
    /// Wire form of the descriptor, without credential declarations
    pub fn to_tool_config(&self) -> McpServerConfig {
        McpServerConfig {
            transport: self.transport.clone(),
            url: self.url.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Names of every secret this descriptor binds
    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.secret_refs.iter().map(|s| s.secret_name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub instance_count: u32,

    #[serde(default)]
    pub observed_generation: i64,
}

/// A named, tenant-independent tool integration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServer {
    pub metadata: ObjectMeta,
    pub spec: McpServerSpec,
    #[serde(default)]
    pub status: McpServerStatus,
}

impl_resource!(McpServer, Kind::McpServer);

impl McpServer {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: McpServerSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: McpServerStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_form_excludes_secret_refs() {
        let spec = McpServerSpec {
            transport: "streamable-http".into(),
            url: "https://mcp.example.com".into(),
            secret_refs: vec![CredentialSource::new("gh").with_env("TOKEN", "token")],
            ..Default::default()
        };
        let value = serde_json::to_value(spec.to_tool_config()).unwrap();
        assert_eq!(
            value,
            json!({"type": "streamable-http", "url": "https://mcp.example.com"})
        );
    }

    #[test]
    fn test_tool_config_known_vs_opaque() {
        let known: ToolConfig =
            serde_json::from_value(json!({"type": "stdio", "command": "gh-mcp"})).unwrap();
        assert!(matches!(known, ToolConfig::Known(_)));

        let opaque: ToolConfig =
            serde_json::from_value(json!({"type": "stdio", "command": "x", "timeoutMs": 5}))
                .unwrap();
        assert!(matches!(opaque, ToolConfig::Opaque(_)));
        assert_eq!(opaque.to_value()["timeoutMs"], 5);
    }
}
