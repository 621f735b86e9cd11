//! Rendered configuration map
//!
//! Everything the agent reads from files lives in one map per instance.
//! The workload mounts individual keys, and a checksum of the whole map is
//! stamped on the pod template so a config change restarts the agent.

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;
use warden_types::naming::{self, instance_labels};
use warden_types::{ConfigMap, Instance, ObjectMeta, Resource, SkillConfig};

pub const KEY_SYSTEM_PROMPT: &str = "system-prompt";
pub const KEY_APPEND_SYSTEM_PROMPT: &str = "append-system-prompt";
pub const KEY_MCP_CONFIG: &str = "mcp-config.json";
pub const KEY_JSON_SCHEMA: &str = "json-schema";
pub const KEY_AGENTS: &str = "agents";
pub const KEY_SETTINGS: &str = "settings.json";
pub const KEY_SOUL: &str = "soul";
pub const SKILL_PREFIX: &str = "skill-";
pub const AGENT_FILE_PREFIX: &str = "agentfile-";
pub const HOOK_SCRIPT_PREFIX: &str = "hookscript-";

/// Pretty JSON, optionally wrapped as `{"<wrapper>": value}`
fn render_json<T: Serialize>(value: &T, wrapper: Option<&str>) -> Result<String> {
    let rendered = match wrapper {
        Some(key) => serde_json::to_string_pretty(&BTreeMap::from([(key, value)]))?,
        None => serde_json::to_string_pretty(value)?,
    };
    Ok(rendered)
}

/// Quote a frontmatter scalar
fn quoted(value: &str) -> String {
    // A JSON string literal is valid double-quoted YAML
    serde_json::Value::String(value.to_string()).to_string()
}

/// SKILL.md with frontmatter followed by the skill body
pub fn render_skill(skill: &SkillConfig) -> String {
    let mut out = String::from("---\n");

    if !skill.description.is_empty() {
        let _ = writeln!(out, "description: {}", quoted(&skill.description));
    }
    if let Some(disabled) = skill.disable_model_invocation {
        let _ = writeln!(out, "disableModelInvocation: {disabled}");
    }
    if let Some(invocable) = skill.user_invocable {
        let _ = writeln!(out, "userInvocable: {invocable}");
    }
    if !skill.allowed_tools.is_empty() {
        let _ = writeln!(out, "allowedTools: {}", quoted(&skill.allowed_tools));
    }
    if !skill.model.is_empty() {
        let _ = writeln!(out, "model: {}", quoted(&skill.model));
    }
    if let Some(context) = &skill.context {
        let _ = write!(out, "context:\n  {}\n", context.to_compact_string());
    }
    if !skill.agent.is_empty() {
        let _ = writeln!(out, "agent: {}", quoted(&skill.agent));
    }
    if !skill.argument_hint.is_empty() {
        let _ = writeln!(out, "argumentHint: {}", quoted(&skill.argument_hint));
    }

    out.push_str("---\n");
    out.push_str(&skill.content);
    if !skill.content.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Build the configuration map for a merged instance
pub fn build_config_map(instance: &Instance, namespace: &str) -> Result<ConfigMap> {
    let bundle = &instance.spec.bundle;
    let agent = &bundle.agent;
    let mut data = BTreeMap::new();

    if !agent.system_prompt.is_empty() {
        data.insert(KEY_SYSTEM_PROMPT.to_string(), agent.system_prompt.clone());
    }
    if !agent.append_system_prompt.is_empty() {
        data.insert(
            KEY_APPEND_SYSTEM_PROMPT.to_string(),
            agent.append_system_prompt.clone(),
        );
    }
    if !agent.mcp_servers.is_empty() {
        data.insert(
            KEY_MCP_CONFIG.to_string(),
            render_json(&agent.mcp_servers, Some("mcpServers"))?,
        );
    }
    if !agent.json_schema.is_empty() {
        data.insert(KEY_JSON_SCHEMA.to_string(), agent.json_schema.clone());
    }
    if !agent.agents.is_empty() {
        data.insert(KEY_AGENTS.to_string(), render_json(&agent.agents, None)?);
    }

    for (name, skill) in &bundle.skills {
        data.insert(format!("{SKILL_PREFIX}{name}"), render_skill(skill));
    }
    for (name, file) in &bundle.agent_files {
        data.insert(format!("{AGENT_FILE_PREFIX}{name}"), file.content.clone());
    }
    if !bundle.hooks.is_empty() {
        data.insert(
            KEY_SETTINGS.to_string(),
            render_json(&bundle.hooks, Some("hooks"))?,
        );
    }
    for (name, script) in &bundle.hook_scripts {
        data.insert(format!("{HOOK_SCRIPT_PREFIX}{name}"), script.clone());
    }
    if !bundle.soul.is_empty() {
        data.insert(KEY_SOUL.to_string(), bundle.soul.clone());
    }

    let name = instance.name();
    Ok(ConfigMap {
        metadata: ObjectMeta {
            labels: instance_labels(name, &instance.spec.owner),
            ..ObjectMeta::new(namespace, naming::config_map_name(name))
        },
        data,
    })
}

/// Hex SHA-256 over the map's entries in key order
pub fn config_checksum(config_map: &ConfigMap) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in &config_map.data {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
