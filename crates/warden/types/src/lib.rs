//! Warden Types - Resource model for the agent instance operator
//!
//! Warden keeps a multi-tenant fleet of AI agent workloads converged with
//! their declared configuration. This crate holds the declarative model the
//! rest of the workspace operates on.
//!
//! ## Key Concepts
//!
//! - **Instance**: a user-declared agent workload and its configuration
//! - **Personality**: a reusable, platform-authored configuration template
//! - **McpServer**: a shared, tenant-independent tool integration descriptor
//! - **Condition**: a typed, timestamped boolean status entry
//! - **Dependent kinds**: the infrastructure objects an instance converges to

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod bundle;
pub mod condition;
pub mod infra;
pub mod instance;
pub mod mcp_server;
pub mod meta;
pub mod naming;
pub mod personality;

pub use bundle::{
    AgentConfig, AgentFileConfig, ConfigBundle, CredentialSource, McpServerReference,
    PluginReference, RawConfig, ResourceRequirements, SkillConfig, TelemetryConfig, OtlpConfig,
};
pub use condition::{find_condition, is_condition_false, set_condition, Condition, ConditionStatus};
pub use infra::{
    ConfigMap, EnvSource, EnvVar, InitContainer, Namespace, PersistentVolumeClaim, PvcSpec,
    RegistrationSpec, Secret, Service, ServiceAccount, ServiceSpec, ToolRegistration, Volume, VolumeMount,
    VolumeSource, Workload, WorkloadSpec, WorkloadStatus,
};
pub use instance::{
    GitSecretReference, Instance, InstanceMode, InstanceSpec, InstanceState, InstanceStatus,
    RegistrationConfig, TemplateSelector, WorkspaceConfig,
};
pub use mcp_server::{
    McpServer, McpServerConfig, McpServerSpec, McpServerStatus, ToolConfig, STDIO_TRANSPORT,
    URL_TRANSPORTS,
};
pub use meta::{Kind, ObjectKey, ObjectMeta, Resource};
pub use personality::{Personality, PersonalitySpec, PersonalityStatus};
