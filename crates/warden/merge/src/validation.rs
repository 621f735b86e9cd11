//! Static validation of merged configuration
//!
//! Runs after every layer has been merged and before anything is applied.
//! A failure here is terminal until the user edits the object.

use std::collections::HashSet;
use thiserror::Error;
use warden_types::{ConfigBundle, InstanceSpec, PersonalitySpec, PluginReference, TemplateSelector};

const DIGEST_PREFIX: &str = "sha256:";

/// Static spec violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("hooks and agent.settingsFile are mutually exclusive")]
    HooksWithSettingsFile,

    #[error("plugin {repository}: exactly one of tag or digest must be set")]
    PluginVersion { repository: String },

    #[error("plugin {repository}: digest must start with \"sha256:\", got {digest:?}")]
    PluginDigest { repository: String, digest: String },

    #[error("duplicate plugin short name {0:?}")]
    DuplicatePluginName(String),

    #[error("duplicate MCP server reference {0:?}")]
    DuplicateMcpServerRef(String),

    #[error("duplicate credential source for secret {0:?}")]
    DuplicateCredentialSource(String),

    #[error("owner must not be empty")]
    MissingOwner,

    #[error("personality selector must name a personality or an artifact reference")]
    EmptySelector,
}

pub type Result<T> = std::result::Result<T, ValidationError>;

fn validate_plugin(plugin: &PluginReference) -> Result<()> {
    if plugin.tag.is_empty() == plugin.digest.is_empty() {
        return Err(ValidationError::PluginVersion {
            repository: plugin.repository.clone(),
        });
    }
    if !plugin.digest.is_empty() && !plugin.digest.starts_with(DIGEST_PREFIX) {
        return Err(ValidationError::PluginDigest {
            repository: plugin.repository.clone(),
            digest: plugin.digest.clone(),
        });
    }
    Ok(())
}

fn first_duplicate<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .find(|key| !seen.insert(*key))
        .map(str::to_string)
}

/// Rules shared by instances and personalities
pub fn validate_bundle(bundle: &ConfigBundle) -> Result<()> {
    if !bundle.hooks.is_empty() && !bundle.agent.settings_file.is_empty() {
        return Err(ValidationError::HooksWithSettingsFile);
    }

    for plugin in &bundle.plugins {
        validate_plugin(plugin)?;
    }
    if let Some(name) = first_duplicate(bundle.plugins.iter().map(|p| p.short_name())) {
        return Err(ValidationError::DuplicatePluginName(name));
    }

    if let Some(name) = first_duplicate(bundle.mcp_servers.iter().map(|r| r.name.as_str())) {
        return Err(ValidationError::DuplicateMcpServerRef(name));
    }

    if let Some(name) = first_duplicate(
        bundle
            .agent
            .mcp_server_secrets
            .iter()
            .map(|s| s.secret_name.as_str()),
    ) {
        return Err(ValidationError::DuplicateCredentialSource(name));
    }

    Ok(())
}

pub fn validate_instance(spec: &InstanceSpec) -> Result<()> {
    if spec.owner.trim().is_empty() {
        return Err(ValidationError::MissingOwner);
    }
    if let Some(selector) = &spec.personality {
        let value = match selector {
            TemplateSelector::Named(name) => name,
            TemplateSelector::Artifact(reference) => reference,
        };
        if value.trim().is_empty() {
            return Err(ValidationError::EmptySelector);
        }
    }
    validate_bundle(&spec.bundle)
}

pub fn validate_personality(spec: &PersonalitySpec) -> Result<()> {
    validate_bundle(&spec.bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_types::{CredentialSource, McpServerReference, RawConfig};

    fn instance() -> InstanceSpec {
        InstanceSpec {
            owner: "alice".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_minimal_instance() {
        assert!(validate_instance(&instance()).is_ok());
    }

    #[test]
    fn test_missing_owner() {
        assert_eq!(
            validate_instance(&InstanceSpec::default()),
            Err(ValidationError::MissingOwner)
        );
    }

    #[test]
    fn test_hooks_conflict_with_settings_file() {
        let mut spec = instance();
        spec.bundle
            .hooks
            .insert("PreToolUse".into(), RawConfig(json!([])));
        spec.bundle.agent.settings_file = "/etc/settings.json".into();
        assert_eq!(
            validate_instance(&spec),
            Err(ValidationError::HooksWithSettingsFile)
        );
    }

    #[test]
    fn test_plugin_needs_exactly_one_version() {
        let mut spec = instance();
        spec.bundle.plugins = vec![PluginReference {
            repository: "acme/lint".into(),
            tag: "v1".into(),
            digest: "sha256:ab".into(),
        }];
        assert!(matches!(
            validate_instance(&spec),
            Err(ValidationError::PluginVersion { .. })
        ));

        spec.bundle.plugins[0].tag.clear();
        spec.bundle.plugins[0].digest = "md5:ab".into();
        assert!(matches!(
            validate_instance(&spec),
            Err(ValidationError::PluginDigest { .. })
        ));
    }

    #[test]
    fn test_duplicate_plugin_short_names() {
        let mut spec = instance();
        spec.bundle.plugins = vec![
            PluginReference::tagged("ghcr.io/a/lint", "v1"),
            PluginReference::tagged("ghcr.io/b/lint", "v1"),
        ];
        assert_eq!(
            validate_instance(&spec),
            Err(ValidationError::DuplicatePluginName("lint".into()))
        );
    }

    #[test]
    fn test_duplicate_refs_and_sources() {
        let mut spec = instance();
        spec.bundle.mcp_servers = vec![McpServerReference::new("gh"), McpServerReference::new("gh")];
        assert_eq!(
            validate_instance(&spec),
            Err(ValidationError::DuplicateMcpServerRef("gh".into()))
        );

        let mut spec = instance();
        spec.bundle.agent.mcp_server_secrets =
            vec![CredentialSource::new("s"), CredentialSource::new("s")];
        assert_eq!(
            validate_instance(&spec),
            Err(ValidationError::DuplicateCredentialSource("s".into()))
        );
    }

    #[test]
    fn test_empty_selector() {
        let mut spec = instance();
        spec.personality = Some(TemplateSelector::Artifact(" ".into()));
        assert_eq!(validate_instance(&spec), Err(ValidationError::EmptySelector));
    }
}
