//! Reusable configuration templates

use crate::bundle::ConfigBundle;
use crate::condition::Condition;
use crate::impl_resource;
use crate::meta::{Kind, ObjectMeta};
use serde::{Deserialize, Serialize};

/// Template shape: the instance bundle minus per-instance fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalitySpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(flatten)]
    pub bundle: ConfigBundle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub instance_count: u32,

    #[serde(default)]
    pub plugin_count: u32,

    #[serde(default)]
    pub mcp_server_count: u32,

    #[serde(default)]
    pub observed_generation: i64,
}

/// A platform-authored template; read-only input to the merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub metadata: ObjectMeta,
    pub spec: PersonalitySpec,
    #[serde(default)]
    pub status: PersonalityStatus,
}

impl_resource!(Personality, Kind::Personality);

impl Personality {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: PersonalitySpec,
    ) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: PersonalityStatus::default(),
        }
    }
}
