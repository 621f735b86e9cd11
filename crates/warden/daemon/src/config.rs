//! Configuration for wardend

use serde::{Deserialize, Serialize};
use warden_controller::ControllerConfig;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Reconciler settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Local object store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// YAML file of objects loaded into the store at start-up
    #[serde(default)]
    pub seed_file: Option<String>,

    /// Directory served as the remote template registry
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Report every workload as available once it is applied
    #[serde(default = "default_true")]
    pub simulate_workloads: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            seed_file: None,
            artifact_dir: default_artifact_dir(),
            simulate_workloads: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_artifact_dir() -> String {
    "/var/lib/warden/artifacts".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then `WARDEN_*`
    /// environment variables (`WARDEN_CONTROLLER__WORKERS=4`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WARDEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
