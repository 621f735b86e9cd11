//! Untyped stored form of an object

use crate::error::Result;
use serde_json::{Map, Value};
use warden_types::{Kind, ObjectKey, ObjectMeta, Resource};

const METADATA: &str = "metadata";
const STATUS: &str = "status";

/// An object as the store keeps it: metadata plus an opaque body
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicObject {
    pub kind: Kind,
    pub metadata: ObjectMeta,
    /// Every top-level field except `metadata`
    pub body: Map<String, Value>,
}

impl DynamicObject {
    /// Convert a typed resource into its stored form
    pub fn from_resource<K: Resource>(resource: &K) -> Result<Self> {
        let mut body = match serde_json::to_value(resource)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.remove(METADATA);
        Ok(Self {
            kind: K::KIND,
            metadata: resource.meta().clone(),
            body,
        })
    }

    /// Convert back into a typed resource
    pub fn into_resource<K: Resource>(self) -> Result<K> {
        let mut map = self.body;
        map.insert(METADATA.to_string(), serde_json::to_value(&self.metadata)?);
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn status(&self) -> Option<&Value> {
        self.body.get(STATUS)
    }

    /// Body without the status subresource
    pub fn spec_body(&self) -> Map<String, Value> {
        let mut body = self.body.clone();
        body.remove(STATUS);
        body
    }

    /// Replace the status subresource
    pub fn set_status(&mut self, status: Option<Value>) {
        match status {
            Some(status) => {
                self.body.insert(STATUS.to_string(), status);
            }
            None => {
                self.body.remove(STATUS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{ConfigMap, Workload};

    #[test]
    fn test_round_trip_keeps_metadata() {
        let mut cm = ConfigMap::default();
        cm.metadata = ObjectMeta::new("ops", "a-config");
        cm.data.insert("k".into(), "v".into());

        let object = DynamicObject::from_resource(&cm).unwrap();
        assert_eq!(object.kind, Kind::ConfigMap);
        assert!(!object.body.contains_key("metadata"));

        let back: ConfigMap = object.into_resource().unwrap();
        assert_eq!(back, cm);
    }

    #[test]
    fn test_spec_body_excludes_status() {
        let mut workload = Workload::default();
        workload.metadata = ObjectMeta::new("ops", "a");
        workload.status.available_replicas = 1;
        let object = DynamicObject::from_resource(&workload).unwrap();
        assert!(object.status().is_some());
        assert!(!object.spec_body().contains_key("status"));
    }
}
