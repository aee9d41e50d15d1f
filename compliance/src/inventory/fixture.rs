//! Inventory source backed by a static JSON document.
//!
//! Document shape:
//!
//! ```json
//! {"resources": [
//!   {"type": "aws.s3.bucket.posture", "name": "audit-logs",
//!    "attributes": {"encryption": {"ServerSideEncryptionConfiguration": {}}}}
//! ]}
//! ```
//!
//! An attribute group that is missing (or `null`) answers `Absent`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AttributeFetch, InventoryError, InventorySource, ResourceKind, ResourceRef};
use crate::error::{ComplianceError, ComplianceResult};

/// One resource entry in an inventory document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InventoryResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InventoryDocument {
    pub resources: Vec<InventoryResource>,
}

/// Serves resources from memory, with optional failure injection.
pub struct StaticInventory {
    resources: Vec<InventoryResource>,
    enumeration_failure: Option<InventoryError>,
    /// Remaining transient failures keyed by (resource, group).
    transient: Mutex<HashMap<(String, String), u32>>,
}

impl StaticInventory {
    pub fn new(resources: Vec<InventoryResource>) -> Self {
        Self {
            resources,
            enumeration_failure: None,
            transient: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_json(json: &str) -> ComplianceResult<Self> {
        let doc: InventoryDocument = serde_json::from_str(json).map_err(|e| {
            ComplianceError::config(format!("invalid inventory document: {}", e))
        })?;
        Ok(Self::new(doc.resources))
    }

    pub fn from_path(path: &Path) -> ComplianceResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ComplianceError::config(format!(
                "cannot read inventory '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Make every `enumerate` call fail with `err`.
    pub fn with_enumeration_failure(mut self, err: InventoryError) -> Self {
        self.enumeration_failure = Some(err);
        self
    }

    /// Make the next `times` fetches of (`resource`, `group`) fail transiently.
    pub fn with_transient_failures(self, resource: &str, group: &str, times: u32) -> Self {
        if let Ok(mut map) = self.transient.lock() {
            map.insert((resource.to_string(), group.to_string()), times);
        }
        self
    }

    fn take_transient(&self, resource: &str, group: &str) -> bool {
        let mut map = match self.transient.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        match map.get_mut(&(resource.to_string(), group.to_string())) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn enumerate(&self, kind: &ResourceKind) -> Result<Vec<ResourceRef>, InventoryError> {
        if let Some(err) = &self.enumeration_failure {
            return Err(err.clone());
        }
        Ok(self
            .resources
            .iter()
            .filter(|r| r.resource_type == kind.type_tag)
            .map(|r| ResourceRef::new(r.name.clone()))
            .collect())
    }

    async fn fetch_attribute(
        &self,
        kind: &ResourceKind,
        resource: &ResourceRef,
        group: &str,
    ) -> AttributeFetch {
        if self.take_transient(&resource.name, group) {
            return AttributeFetch::Transient(format!(
                "throttled fetching {} for {}",
                group, resource.name
            ));
        }
        let entry = self
            .resources
            .iter()
            .find(|r| r.resource_type == kind.type_tag && r.name == resource.name);
        match entry.and_then(|r| r.attributes.get(group)) {
            Some(Value::Null) | None => AttributeFetch::Absent,
            Some(value) => AttributeFetch::Present(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"resources": [
        {"type": "aws.s3.bucket.posture", "name": "a",
         "attributes": {"encryption": {"ServerSideEncryptionConfiguration": {"Rules": []}}}},
        {"type": "aws.s3.bucket.posture", "name": "b"},
        {"type": "gcp.gcs.bucket.posture", "name": "c"}
    ]}"#;

    #[tokio::test]
    async fn test_enumerate_filters_by_kind() {
        let inv = StaticInventory::from_json(DOC).unwrap();
        let refs = inv.enumerate(&ResourceKind::s3_bucket()).await.unwrap();
        assert_eq!(refs, vec![ResourceRef::new("a"), ResourceRef::new("b")]);
    }

    #[tokio::test]
    async fn test_missing_attribute_is_absent() {
        let inv = StaticInventory::from_json(DOC).unwrap();
        let kind = ResourceKind::s3_bucket();
        let fetched = inv
            .fetch_attribute(&kind, &ResourceRef::new("b"), "encryption")
            .await;
        assert_eq!(fetched, AttributeFetch::Absent);
        let fetched = inv
            .fetch_attribute(&kind, &ResourceRef::new("a"), "encryption")
            .await;
        assert!(matches!(fetched, AttributeFetch::Present(_)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_consumed() {
        let inv = StaticInventory::from_json(DOC)
            .unwrap()
            .with_transient_failures("a", "encryption", 1);
        let kind = ResourceKind::s3_bucket();
        let r = ResourceRef::new("a");
        assert!(matches!(
            inv.fetch_attribute(&kind, &r, "encryption").await,
            AttributeFetch::Transient(_)
        ));
        assert!(matches!(
            inv.fetch_attribute(&kind, &r, "encryption").await,
            AttributeFetch::Present(_)
        ));
    }

    #[test]
    fn test_invalid_document_is_config_error() {
        let err = StaticInventory::from_json("{").err().unwrap();
        assert!(matches!(err, ComplianceError::Config { .. }));
    }
}
