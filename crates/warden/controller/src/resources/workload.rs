//! Agent workload, its environment and volumes

use super::config_map::{
    AGENT_FILE_PREFIX, HOOK_SCRIPT_PREFIX, KEY_AGENTS, KEY_APPEND_SYSTEM_PROMPT, KEY_JSON_SCHEMA,
    KEY_MCP_CONFIG, KEY_SETTINGS, KEY_SOUL, KEY_SYSTEM_PROMPT, SKILL_PREFIX,
};
use super::{
    CONFIG_VOLUME, EXTENSIONS_PATH, GIT_SECRET_MOUNT_PATH, GIT_SECRET_VOLUME, HOOK_SCRIPTS_PATH,
    MCP_CONFIG_PATH, PLUGIN_BASE_PATH, SETTINGS_FILE_PATH, SOUL_PATH, WORKSPACE_MOUNT_PATH,
    WORKSPACE_VOLUME,
};
use crate::config::ControllerConfig;
use std::collections::BTreeMap;
use warden_types::naming::{self, instance_labels, CONFIG_CHECKSUM_ANNOTATION};
use warden_types::{
    ConfigBundle, EnvSource, EnvVar, InitContainer, Instance, ObjectMeta, PluginReference,
    Resource, TelemetryConfig, Volume, VolumeMount, VolumeSource, Workload, WorkloadSpec,
    WorkloadStatus, WorkspaceConfig,
};

fn from_config_map(name: &str, config_map: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvSource::ConfigMapKey {
            name: config_map.to_string(),
            key: key.to_string(),
        }),
    }
}

fn plugin_volume_name(plugin: &PluginReference) -> String {
    format!("plugin-{}", plugin.short_name())
}

fn plugin_mount_path(plugin: &PluginReference) -> String {
    format!("{PLUGIN_BASE_PATH}/{}", plugin.short_name())
}

fn has_inline_extensions(bundle: &ConfigBundle) -> bool {
    !bundle.skills.is_empty() || !bundle.agent_files.is_empty()
}

fn plugin_dirs(bundle: &ConfigBundle) -> Vec<String> {
    bundle
        .plugin_dirs
        .iter()
        .cloned()
        .chain(bundle.plugins.iter().map(plugin_mount_path))
        .collect()
}

fn add_dirs(bundle: &ConfigBundle) -> Vec<String> {
    let mut dirs = bundle.add_dirs.clone();
    if has_inline_extensions(bundle) {
        dirs.push(EXTENSIONS_PATH.to_string());
    }
    dirs
}

fn telemetry_env(telemetry: &TelemetryConfig, env: &mut Vec<EnvVar>) {
    if telemetry.enabled != Some(true) {
        return;
    }
    env.push(EnvVar::value("AGENT_ENABLE_TELEMETRY", "1"));
    if !telemetry.metrics_exporter.is_empty() {
        env.push(EnvVar::value("OTEL_METRICS_EXPORTER", &telemetry.metrics_exporter));
    }
    if !telemetry.logs_exporter.is_empty() {
        env.push(EnvVar::value("OTEL_LOGS_EXPORTER", &telemetry.logs_exporter));
    }
    if let Some(otlp) = &telemetry.otlp {
        if !otlp.protocol.is_empty() {
            env.push(EnvVar::value("OTEL_EXPORTER_OTLP_PROTOCOL", &otlp.protocol));
        }
        if !otlp.endpoint.is_empty() {
            env.push(EnvVar::value("OTEL_EXPORTER_OTLP_ENDPOINT", &otlp.endpoint));
        }
        if !otlp.headers.is_empty() {
            env.push(EnvVar::value("OTEL_EXPORTER_OTLP_HEADERS", &otlp.headers));
        }
    }
    if let Some(ms) = telemetry.metric_export_interval_ms {
        env.push(EnvVar::value("OTEL_METRIC_EXPORT_INTERVAL", ms.to_string()));
    }
    if let Some(ms) = telemetry.logs_export_interval_ms {
        env.push(EnvVar::value("OTEL_BLRP_SCHEDULE_DELAY", ms.to_string()));
    }
    if telemetry.log_user_prompts == Some(true) {
        env.push(EnvVar::value("AGENT_LOG_USER_PROMPTS", "true"));
    }
    if telemetry.log_tool_details == Some(true) {
        env.push(EnvVar::value("AGENT_LOG_TOOL_DETAILS", "true"));
    }
    if !telemetry.resource_attributes.is_empty() {
        env.push(EnvVar::value(
            "OTEL_RESOURCE_ATTRIBUTES",
            &telemetry.resource_attributes,
        ));
    }
}

/// Environment for the agent container
pub fn build_env(instance: &Instance, config: &ControllerConfig) -> Vec<EnvVar> {
    let name = instance.name();
    let bundle = &instance.spec.bundle;
    let agent = &bundle.agent;
    let config_map = naming::config_map_name(name);
    let mut env = vec![
        EnvVar::value("PORT", config.service_port.to_string()),
        EnvVar::secret_key(
            "AGENT_API_KEY",
            naming::api_key_secret_name(name),
            &config.api_key_key,
        ),
    ];

    if !agent.model.is_empty() {
        env.push(EnvVar::value("AGENT_MODEL", &agent.model));
    }
    if let Some(turns) = agent.max_turns {
        env.push(EnvVar::value("AGENT_MAX_TURNS", turns.to_string()));
    }
    if !agent.permission_mode.is_empty() {
        env.push(EnvVar::value("AGENT_PERMISSION_MODE", &agent.permission_mode));
    }
    if !agent.system_prompt.is_empty() {
        env.push(from_config_map("AGENT_SYSTEM_PROMPT", &config_map, KEY_SYSTEM_PROMPT));
    }
    if !agent.append_system_prompt.is_empty() {
        env.push(from_config_map(
            "AGENT_APPEND_SYSTEM_PROMPT",
            &config_map,
            KEY_APPEND_SYSTEM_PROMPT,
        ));
    }
    if !agent.mcp_servers.is_empty() {
        env.push(EnvVar::value("AGENT_MCP_CONFIG", MCP_CONFIG_PATH));
    }
    if let Some(strict) = agent.strict_mcp_config {
        env.push(EnvVar::value("AGENT_STRICT_MCP_CONFIG", strict.to_string()));
    }
    if let Some(timeout) = agent.mcp_timeout {
        env.push(EnvVar::value("MCP_TIMEOUT", timeout.to_string()));
    }
    if let Some(tokens) = agent.max_mcp_output_tokens {
        env.push(EnvVar::value("MAX_MCP_OUTPUT_TOKENS", tokens.to_string()));
    }

    // Credential bindings for ${VAR} expansion in tool configs
    for source in &agent.mcp_server_secrets {
        for (var, key) in &source.env {
            env.push(EnvVar::secret_key(var, &source.secret_name, key));
        }
    }

    if let Some(budget) = agent.max_budget_usd {
        env.push(EnvVar::value("AGENT_MAX_BUDGET_USD", format!("{budget:.2}")));
    }
    if !agent.effort.is_empty() {
        env.push(EnvVar::value("AGENT_EFFORT", &agent.effort));
    }
    if !agent.fallback_model.is_empty() {
        env.push(EnvVar::value("AGENT_FALLBACK_MODEL", &agent.fallback_model));
    }
    if !agent.json_schema.is_empty() {
        env.push(from_config_map("AGENT_JSON_SCHEMA", &config_map, KEY_JSON_SCHEMA));
    }

    // Inline hooks take the settings slot
    if !bundle.hooks.is_empty() {
        env.push(EnvVar::value("AGENT_SETTINGS_FILE", SETTINGS_FILE_PATH));
    } else if !agent.settings_file.is_empty() {
        env.push(EnvVar::value("AGENT_SETTINGS_FILE", &agent.settings_file));
    }
    if !agent.setting_sources.is_empty() {
        env.push(EnvVar::value("AGENT_SETTING_SOURCES", &agent.setting_sources));
    }

    for (var, list) in [
        ("AGENT_TOOLS", &agent.tools),
        ("AGENT_ALLOWED_TOOLS", &agent.allowed_tools),
        ("AGENT_DISALLOWED_TOOLS", &agent.disallowed_tools),
    ] {
        if !list.is_empty() {
            env.push(EnvVar::value(var, list.join(",")));
        }
    }

    let plugin_dirs = plugin_dirs(bundle);
    if !plugin_dirs.is_empty() {
        env.push(EnvVar::value("AGENT_PLUGIN_DIRS", plugin_dirs.join(",")));
    }
    let add_dirs = add_dirs(bundle);
    if !add_dirs.is_empty() {
        env.push(EnvVar::value("AGENT_ADD_DIRS", add_dirs.join(",")));
        if bundle.load_additional_dirs_memory != Some(false) {
            env.push(EnvVar::value("AGENT_ADDITIONAL_DIRECTORIES_MEMORY", "true"));
        }
    }

    if !agent.agents.is_empty() {
        env.push(from_config_map("AGENT_AGENTS", &config_map, KEY_AGENTS));
    }
    if !agent.active_agent.is_empty() {
        env.push(EnvVar::value("AGENT_ACTIVE_AGENT", &agent.active_agent));
    }
    for (var, flag) in [
        ("AGENT_PERSISTENT_MODE", agent.persistent_mode),
        ("AGENT_INCLUDE_PARTIAL_MESSAGES", agent.include_partial_messages),
        ("AGENT_NO_SESSION_PERSISTENCE", agent.no_session_persistence),
    ] {
        if flag == Some(true) {
            env.push(EnvVar::value(var, "true"));
        }
    }
    if !bundle.soul.is_empty() {
        env.push(EnvVar::value("AGENT_SOUL_FILE", SOUL_PATH));
    }
    if !instance.spec.owner.is_empty() {
        env.push(EnvVar::value("AGENT_OWNER_SUBJECT", &instance.spec.owner));
    }
    if let Some(telemetry) = &bundle.telemetry {
        telemetry_env(telemetry, &mut env);
    }

    env
}

fn config_mount(mount_path: String, key: String) -> VolumeMount {
    VolumeMount {
        name: CONFIG_VOLUME.to_string(),
        mount_path,
        read_only: true,
        sub_path: Some(key),
    }
}

fn workspace_mount() -> VolumeMount {
    VolumeMount {
        name: WORKSPACE_VOLUME.to_string(),
        mount_path: WORKSPACE_MOUNT_PATH.to_string(),
        read_only: false,
        sub_path: None,
    }
}

/// Single-quote for `sh`, escaping embedded quotes
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Clone on first start, fast-forward an existing checkout afterwards
fn git_clone_script(workspace: &WorkspaceConfig) -> String {
    let mut script = String::new();
    if let Some(secret) = workspace.git_secret() {
        script.push_str(&format!(
            "export GIT_SSH_COMMAND='ssh -i {GIT_SECRET_MOUNT_PATH}/{} -o StrictHostKeyChecking=accept-new'\n",
            secret.key_or_default()
        ));
    }

    let repo = shell_quote(&workspace.git_repo);
    let dir = WORKSPACE_MOUNT_PATH;
    if workspace.git_ref.is_empty() {
        script.push_str(&format!(
            "if [ ! -d {dir}/.git ]; then\n  git clone {repo} {dir}\nelse\n  \
             cd {dir} && git pull || echo 'WARNING: git update failed, using existing checkout'\nfi"
        ));
    } else {
        let git_ref = shell_quote(&workspace.git_ref);
        script.push_str(&format!(
            "if [ ! -d {dir}/.git ]; then\n  git clone --branch {git_ref} {repo} {dir}\nelse\n  \
             cd {dir} && git fetch origin && git checkout {git_ref} && git pull origin {git_ref} \
             || echo 'WARNING: git update failed, using existing checkout'\nfi"
        ));
    }
    script
}

/// Init container cloning the workspace repository, if one is configured
fn build_init_containers(instance: &Instance, config: &ControllerConfig) -> Vec<InitContainer> {
    let Some(workspace) = instance
        .spec
        .workspace
        .as_ref()
        .filter(|w| w.needs_git_clone())
    else {
        return Vec::new();
    };

    let mut mounts = vec![workspace_mount()];
    if workspace.git_secret().is_some() {
        mounts.push(VolumeMount {
            name: GIT_SECRET_VOLUME.to_string(),
            mount_path: GIT_SECRET_MOUNT_PATH.to_string(),
            read_only: true,
            sub_path: None,
        });
    }

    vec![InitContainer {
        name: "git-clone".to_string(),
        image: config.git_clone_image.clone(),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec![git_clone_script(workspace)],
        mounts,
    }]
}

fn build_volumes(instance: &Instance) -> (Vec<Volume>, Vec<VolumeMount>) {
    let name = instance.name();
    let bundle = &instance.spec.bundle;
    let mut volumes = vec![Volume {
        name: CONFIG_VOLUME.to_string(),
        source: VolumeSource::ConfigMap {
            name: naming::config_map_name(name),
        },
    }];
    let mut mounts = Vec::new();

    if !bundle.agent.mcp_servers.is_empty() {
        mounts.push(config_mount(MCP_CONFIG_PATH.into(), KEY_MCP_CONFIG.into()));
    }
    for skill in bundle.skills.keys() {
        mounts.push(config_mount(
            format!("{EXTENSIONS_PATH}/skills/{skill}/SKILL.md"),
            format!("{SKILL_PREFIX}{skill}"),
        ));
    }
    for file in bundle.agent_files.keys() {
        mounts.push(config_mount(
            format!("{EXTENSIONS_PATH}/agents/{file}.md"),
            format!("{AGENT_FILE_PREFIX}{file}"),
        ));
    }
    if !bundle.hooks.is_empty() {
        mounts.push(config_mount(SETTINGS_FILE_PATH.into(), KEY_SETTINGS.into()));
    }
    for script in bundle.hook_scripts.keys() {
        mounts.push(config_mount(
            format!("{HOOK_SCRIPTS_PATH}/{script}"),
            format!("{HOOK_SCRIPT_PREFIX}{script}"),
        ));
    }
    if !bundle.soul.is_empty() {
        mounts.push(config_mount(SOUL_PATH.into(), KEY_SOUL.into()));
    }

    for plugin in &bundle.plugins {
        volumes.push(Volume {
            name: plugin_volume_name(plugin),
            source: VolumeSource::Image {
                reference: plugin.image_reference(),
            },
        });
        mounts.push(VolumeMount {
            name: plugin_volume_name(plugin),
            mount_path: plugin_mount_path(plugin),
            read_only: true,
            sub_path: None,
        });
    }

    if let Some(workspace) = &instance.spec.workspace {
        volumes.push(Volume {
            name: WORKSPACE_VOLUME.to_string(),
            source: VolumeSource::Claim {
                claim_name: naming::pvc_name(name),
            },
        });
        mounts.push(workspace_mount());
        if workspace.git_secret().is_some() {
            volumes.push(Volume {
                name: GIT_SECRET_VOLUME.to_string(),
                source: VolumeSource::Secret {
                    secret_name: naming::git_secret_name(name),
                },
            });
        }
    }

    (volumes, mounts)
}

/// Single-replica agent workload
pub fn build_workload(
    instance: &Instance,
    namespace: &str,
    config_checksum: &str,
    config: &ControllerConfig,
) -> Workload {
    let name = instance.name();
    let bundle = &instance.spec.bundle;
    let image = if bundle.image.is_empty() {
        config.default_image.clone()
    } else {
        bundle.image.clone()
    };
    let (volumes, mounts) = build_volumes(instance);

    Workload {
        metadata: ObjectMeta {
            labels: instance_labels(name, &instance.spec.owner),
            ..ObjectMeta::new(namespace, naming::workload_name(name))
        },
        spec: WorkloadSpec {
            replicas: 1,
            image,
            init_containers: build_init_containers(instance, config),
            env: build_env(instance, config),
            volumes,
            mounts,
            pod_annotations: BTreeMap::from([(
                CONFIG_CHECKSUM_ANNOTATION.to_string(),
                config_checksum.to_string(),
            )]),
            service_account: naming::service_account_name(name),
            resources: bundle.resources.clone(),
        },
        status: WorkloadStatus::default(),
    }
}
