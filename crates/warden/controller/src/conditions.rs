//! Condition types and reasons

pub const READY: &str = "Ready";
pub const CONFIG_READY: &str = "ConfigReady";
pub const DEPLOYMENT_READY: &str = "DeploymentReady";
pub const MCP_SERVER_READY: &str = "McpServerReady";
pub const VALID: &str = "Valid";
pub const SECRETS_VALID: &str = "SecretsValid";

pub mod reason {
    pub const RECONCILED: &str = "Reconciled";
    pub const PROGRESSING: &str = "Progressing";
    pub const CONFIG_APPLIED: &str = "ConfigApplied";
    pub const WORKLOAD_AVAILABLE: &str = "WorkloadAvailable";
    pub const WORKLOAD_NOT_READY: &str = "WorkloadNotReady";
    pub const API_KEY_MISSING: &str = "ApiKeyMissing";
    pub const REGISTERED: &str = "Registered";
    pub const REGISTRATION_FAILED: &str = "RegistrationFailed";
    pub const DELETING: &str = "Deleting";
    pub const VALIDATION_PASSED: &str = "ValidationPassed";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const SECRETS_FOUND: &str = "SecretsFound";
    pub const SECRET_NOT_FOUND: &str = "SecretNotFound";
    pub const MCP_SERVER_OVERRIDE: &str = "McpServerOverride";
    pub const TEMPLATE_RESOLVED: &str = "PersonalityResolved";
}
