//! Start-up objects for the local store
//!
//! A seed file is one YAML document listing the objects an operator would
//! otherwise create through the control plane:
//!
//! ```yaml
//! secrets:
//!   - namespace: warden-system
//!     name: agent-api-key
//!     stringData:
//!       api-key: sk-...
//! mcpServers:
//!   - metadata: { namespace: warden-system, name: github }
//!     spec: { type: streamable-http, url: https://mcp.example.com }
//! personalities: []
//! instances: []
//! ```

use crate::error::{DaemonError, DaemonResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use warden_store::{Api, ObjectStore};
use warden_types::{Instance, McpServer, Personality, Resource, Secret};

/// A secret given as plain strings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSecret {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub string_data: BTreeMap<String, String>,
}

impl SeedSecret {
    fn to_secret(&self) -> Secret {
        self.string_data.iter().fold(
            Secret::new(&self.namespace, &self.name),
            |secret, (key, value)| secret.with_entry(key.clone(), value.as_bytes().to_vec()),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedFile {
    #[serde(default)]
    pub secrets: Vec<SeedSecret>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
    #[serde(default)]
    pub personalities: Vec<Personality>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl SeedFile {
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let path = path.as_ref();
        let seed_err = |message: String| DaemonError::Seed {
            path: path.display().to_string(),
            message,
        };
        let yaml = std::fs::read_to_string(path).map_err(|e| seed_err(e.to_string()))?;
        Self::parse(&yaml).map_err(|e| seed_err(e.to_string()))
    }

    /// Upsert every object; dependencies go first so the first reconcile
    /// pass finds them
    pub async fn apply(&self, store: Arc<dyn ObjectStore>) -> DaemonResult<usize> {
        let secrets: Api<Secret> = Api::new(store.clone());
        for secret in &self.secrets {
            secrets.apply(&secret.to_secret()).await?;
        }
        apply_all(&Api::new(store.clone()), &self.mcp_servers).await?;
        apply_all(&Api::new(store.clone()), &self.personalities).await?;
        apply_all(&Api::new(store), &self.instances).await?;

        let total = self.secrets.len()
            + self.mcp_servers.len()
            + self.personalities.len()
            + self.instances.len();
        info!(
            secrets = self.secrets.len(),
            mcp_servers = self.mcp_servers.len(),
            personalities = self.personalities.len(),
            instances = self.instances.len(),
            "Seeded store"
        );
        Ok(total)
    }
}

async fn apply_all<K: Resource + PartialEq>(api: &Api<K>, objects: &[K]) -> DaemonResult<()> {
    for object in objects {
        api.apply(object).await?;
    }
    Ok(())
}
