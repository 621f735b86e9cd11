//! Bundle merge

use crate::rules::{concat, keyed, optional, scalar, union};
use warden_types::{AgentConfig, ConfigBundle, InstanceSpec, PersonalitySpec};

/// Merge an override bundle onto a base bundle
pub fn merge(base: &ConfigBundle, overlay: &ConfigBundle) -> ConfigBundle {
    ConfigBundle {
        image: scalar(&base.image, &overlay.image),
        agent: merge_agent(&base.agent, &overlay.agent),
        plugins: keyed(&base.plugins, &overlay.plugins, |p| p.repository.clone()),
        plugin_dirs: concat(&base.plugin_dirs, &overlay.plugin_dirs),
        mcp_servers: keyed(&base.mcp_servers, &overlay.mcp_servers, |r| r.name.clone()),
        skills: union(&base.skills, &overlay.skills),
        agent_files: union(&base.agent_files, &overlay.agent_files),
        hooks: union(&base.hooks, &overlay.hooks),
        hook_scripts: union(&base.hook_scripts, &overlay.hook_scripts),
        add_dirs: concat(&base.add_dirs, &overlay.add_dirs),
        load_additional_dirs_memory: optional(
            &base.load_additional_dirs_memory,
            &overlay.load_additional_dirs_memory,
        ),
        resources: optional(&base.resources, &overlay.resources),
        telemetry: optional(&base.telemetry, &overlay.telemetry),
        soul: scalar(&base.soul, &overlay.soul),
    }
}

pub fn merge_agent(base: &AgentConfig, overlay: &AgentConfig) -> AgentConfig {
    AgentConfig {
        model: scalar(&base.model, &overlay.model),
        max_turns: optional(&base.max_turns, &overlay.max_turns),
        permission_mode: scalar(&base.permission_mode, &overlay.permission_mode),
        system_prompt: scalar(&base.system_prompt, &overlay.system_prompt),
        append_system_prompt: scalar(&base.append_system_prompt, &overlay.append_system_prompt),
        mcp_servers: union(&base.mcp_servers, &overlay.mcp_servers),
        mcp_server_secrets: keyed(&base.mcp_server_secrets, &overlay.mcp_server_secrets, |s| {
            s.secret_name.clone()
        }),
        mcp_timeout: optional(&base.mcp_timeout, &overlay.mcp_timeout),
        max_mcp_output_tokens: optional(&base.max_mcp_output_tokens, &overlay.max_mcp_output_tokens),
        strict_mcp_config: optional(&base.strict_mcp_config, &overlay.strict_mcp_config),
        max_budget_usd: optional(&base.max_budget_usd, &overlay.max_budget_usd),
        effort: scalar(&base.effort, &overlay.effort),
        fallback_model: scalar(&base.fallback_model, &overlay.fallback_model),
        json_schema: scalar(&base.json_schema, &overlay.json_schema),
        settings_file: scalar(&base.settings_file, &overlay.settings_file),
        setting_sources: scalar(&base.setting_sources, &overlay.setting_sources),
        tools: concat(&base.tools, &overlay.tools),
        allowed_tools: concat(&base.allowed_tools, &overlay.allowed_tools),
        disallowed_tools: concat(&base.disallowed_tools, &overlay.disallowed_tools),
        agents: union(&base.agents, &overlay.agents),
        active_agent: scalar(&base.active_agent, &overlay.active_agent),
        persistent_mode: optional(&base.persistent_mode, &overlay.persistent_mode),
        include_partial_messages: optional(
            &base.include_partial_messages,
            &overlay.include_partial_messages,
        ),
        no_session_persistence: optional(
            &base.no_session_persistence,
            &overlay.no_session_persistence,
        ),
    }
}

/// Apply a template under an instance's explicit settings.
///
/// Per-instance fields (owner, selector, workspace, registration) come from
/// the instance untouched. The template is only read.
pub fn merge_personality(template: &PersonalitySpec, instance: &InstanceSpec) -> InstanceSpec {
    InstanceSpec {
        owner: instance.owner.clone(),
        personality: instance.personality.clone(),
        bundle: merge(&template.bundle, &instance.bundle),
        workspace: instance.workspace.clone(),
        registration: instance.registration.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_types::{
        CredentialSource, McpServerReference, PluginReference, RawConfig, ResourceRequirements,
        TemplateSelector, ToolConfig,
    };

    fn bundle_with_model(model: &str) -> ConfigBundle {
        let mut bundle = ConfigBundle::default();
        bundle.agent.model = model.to_string();
        bundle
    }

    #[test]
    fn test_empty_override_inherits_model() {
        let merged = merge(&bundle_with_model("A"), &bundle_with_model(""));
        assert_eq!(merged.agent.model, "A");
    }

    #[test]
    fn test_plugins_replace_in_place_and_append() {
        let base = ConfigBundle {
            plugins: vec![
                PluginReference::tagged("p1", "v1"),
                PluginReference::tagged("p2", "v1"),
            ],
            ..Default::default()
        };
        let overlay = ConfigBundle {
            plugins: vec![
                PluginReference::tagged("p2", "v2"),
                PluginReference::tagged("p3", "v1"),
            ],
            ..Default::default()
        };
        let merged = merge(&base, &overlay);
        assert_eq!(
            merged.plugins,
            vec![
                PluginReference::tagged("p1", "v1"),
                PluginReference::tagged("p2", "v2"),
                PluginReference::tagged("p3", "v1"),
            ]
        );
    }

    #[test]
    fn test_optional_struct_inherited_whole() {
        let mut limits = ResourceRequirements::default();
        limits.limits.insert("cpu".into(), "2".into());
        let base = ConfigBundle {
            resources: Some(limits.clone()),
            ..Default::default()
        };
        let merged = merge(&base, &ConfigBundle::default());
        assert_eq!(merged.resources, Some(limits));
    }

    #[test]
    fn test_tool_map_override_replaces_whole_entry() {
        let mut base = ConfigBundle::default();
        base.agent.mcp_servers.insert(
            "gh".into(),
            ToolConfig::Opaque(RawConfig(json!({"type": "http", "url": "a", "extra": 1}))),
        );
        base.agent.mcp_servers.insert(
            "jira".into(),
            ToolConfig::Opaque(RawConfig(json!({"type": "http", "url": "j"}))),
        );
        let mut overlay = ConfigBundle::default();
        overlay.agent.mcp_servers.insert(
            "gh".into(),
            ToolConfig::Opaque(RawConfig(json!({"type": "http", "url": "b"}))),
        );

        let merged = merge(&base, &overlay);
        assert_eq!(merged.agent.mcp_servers.len(), 2);
        assert_eq!(
            merged.agent.mcp_servers["gh"].to_value(),
            json!({"type": "http", "url": "b"})
        );
    }

    #[test]
    fn test_credential_sources_keyed_by_secret() {
        let mut base = ConfigBundle::default();
        base.agent.mcp_server_secrets = vec![
            CredentialSource::new("a").with_env("A", "k"),
            CredentialSource::new("b").with_env("B", "k"),
        ];
        let mut overlay = ConfigBundle::default();
        overlay.agent.mcp_server_secrets = vec![CredentialSource::new("a").with_env("A2", "k2")];

        let merged = merge(&base, &overlay);
        assert_eq!(merged.agent.mcp_server_secrets.len(), 2);
        assert_eq!(merged.agent.mcp_server_secrets[0].secret_name, "a");
        assert!(merged.agent.mcp_server_secrets[0].env.contains_key("A2"));
    }

    #[test]
    fn test_merge_personality_keeps_instance_fields() {
        let template = PersonalitySpec {
            description: "reviewer".into(),
            bundle: ConfigBundle {
                mcp_servers: vec![McpServerReference::new("github")],
                soul: "calm".into(),
                ..bundle_with_model("sonnet")
            },
        };
        let instance = InstanceSpec {
            owner: "alice".into(),
            personality: Some(TemplateSelector::Named("reviewer".into())),
            bundle: ConfigBundle {
                mcp_servers: vec![McpServerReference::new("jira")],
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = merge_personality(&template, &instance);
        assert_eq!(merged.owner, "alice");
        assert_eq!(merged.bundle.agent.model, "sonnet");
        assert_eq!(merged.bundle.soul, "calm");
        let refs: Vec<_> = merged.bundle.mcp_servers.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(refs, vec!["github", "jira"]);
        assert_eq!(merged.personality, instance.personality);
    }
}
