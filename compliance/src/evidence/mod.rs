//! Evidence record data model: posture snapshots, control mappings, records
//! and their index projection.

pub mod builder;
pub mod canonical;
pub mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ComplianceError, ComplianceResult};

/// Top-level keys of the evidence document that are not posture facts.
pub const RESERVED_KEYS: [&str; 6] = [
    "type",
    "account",
    "region",
    "resource",
    "capturedAt",
    "controlMappings",
];

/// Outcome of a single control judgment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    /// The control requirement is met.
    Pass,
    /// The control requirement is unmet (a gap finding).
    Gap,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Gap => "gap",
        }
    }
}

/// A {framework, control, status} judgment derived from posture facts.
///
/// Field order matters: the derived `Ord` is the canonical ordering used when
/// mappings are serialized into an evidence document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlMapping {
    /// Framework name (e.g. "ISO27001", "PCI DSS").
    pub framework: String,
    /// Control identifier within the framework (e.g. "A.8.24").
    pub control: String,
    /// Human-readable description of the supporting evidence.
    pub evidence: String,
    /// Always serialized, `"pass"` or `"gap"`.
    pub status: MappingStatus,
}

/// Raw facts captured about one resource during one collector run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PostureSnapshot {
    /// Collector / resource kind tag (e.g. "aws.s3.bucket.posture").
    pub resource_type: String,
    pub account: String,
    pub region: String,
    /// Resource name (e.g. the bucket name).
    pub resource: String,
    /// RFC 3339 capture timestamp, second precision, UTC.
    pub captured_at: String,
    /// Attribute groups keyed by name. An absent optional group is `null`.
    pub facts: BTreeMap<String, Value>,
}

impl PostureSnapshot {
    /// Resolve a dotted path (e.g. `publicAccessBlock.BlockPublicAcls`) into the
    /// facts. Returns `None` when any segment is missing or the value is `null`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.facts.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }
}

/// The logical content of a stored evidence blob.
///
/// This is exactly what the content hash covers: identity fields, posture facts
/// flattened at the top level, and the control mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceDocument {
    pub snapshot: PostureSnapshot,
    pub mappings: Vec<ControlMapping>,
}

impl EvidenceDocument {
    /// Build a document, sorting mappings into canonical order.
    pub fn new(snapshot: PostureSnapshot, mut mappings: Vec<ControlMapping>) -> Self {
        mappings.sort();
        mappings.dedup();
        Self { snapshot, mappings }
    }

    /// Convert into the JSON shape of the evidence wire format.
    pub fn to_value(&self) -> ComplianceResult<Value> {
        let s = &self.snapshot;
        let mut map = Map::new();
        for (key, value) in &s.facts {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(ComplianceError::validation(format!(
                    "posture fact '{}' collides with a reserved evidence key",
                    key
                )));
            }
            map.insert(key.clone(), value.clone());
        }
        map.insert("type".to_string(), Value::String(s.resource_type.clone()));
        map.insert("account".to_string(), Value::String(s.account.clone()));
        map.insert("region".to_string(), Value::String(s.region.clone()));
        map.insert("resource".to_string(), Value::String(s.resource.clone()));
        map.insert("capturedAt".to_string(), Value::String(s.captured_at.clone()));
        map.insert(
            "controlMappings".to_string(),
            serde_json::to_value(&self.mappings)?,
        );
        Ok(Value::Object(map))
    }

    /// Parse the JSON shape of the evidence wire format back into a document.
    pub fn from_value(value: Value) -> ComplianceResult<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            _ => {
                return Err(ComplianceError::serialization(
                    "evidence document must be a JSON object",
                ))
            }
        };

        let mut take_str = |key: &str| -> ComplianceResult<String> {
            match map.remove(key) {
                Some(Value::String(s)) => Ok(s),
                _ => Err(ComplianceError::serialization(format!(
                    "evidence document is missing string field '{}'",
                    key
                ))),
            }
        };

        let resource_type = take_str("type")?;
        let account = take_str("account")?;
        let region = take_str("region")?;
        let resource = take_str("resource")?;
        let captured_at = take_str("capturedAt")?;

        let mappings: Vec<ControlMapping> = match map.remove("controlMappings") {
            Some(v) => serde_json::from_value(v)?,
            None => {
                return Err(ComplianceError::serialization(
                    "evidence document is missing 'controlMappings'",
                ))
            }
        };

        let facts = map.into_iter().collect::<BTreeMap<_, _>>();

        Ok(Self {
            snapshot: PostureSnapshot {
                resource_type,
                account,
                region,
                resource,
                captured_at,
                facts,
            },
            mappings,
        })
    }
}

/// An immutable, hashed, identified evidence record.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    /// Globally unique identifier, not derived from content.
    pub id: String,
    pub document: EvidenceDocument,
    /// SHA-256 hex digest of `canonical_bytes`.
    pub content_hash: String,
    /// Blob key under which `canonical_bytes` are stored.
    pub storage_key: String,
    canonical_bytes: Vec<u8>,
}

impl EvidenceRecord {
    pub(crate) fn from_parts(
        id: String,
        document: EvidenceDocument,
        content_hash: String,
        storage_key: String,
        canonical_bytes: Vec<u8>,
    ) -> Self {
        Self {
            id,
            document,
            content_hash,
            storage_key,
            canonical_bytes,
        }
    }

    pub fn snapshot(&self) -> &PostureSnapshot {
        &self.document.snapshot
    }

    pub fn mappings(&self) -> &[ControlMapping] {
        &self.document.mappings
    }

    /// The exact bytes written to the blob store.
    pub fn canonical_bytes(&self) -> &[u8] {
        &self.canonical_bytes
    }

    /// Denormalized projection stored in the index.
    pub fn index_entry(&self) -> IndexEntry {
        let s = self.snapshot();
        IndexEntry {
            id: self.id.clone(),
            created_at: s.captured_at.clone(),
            resource: s.resource.clone(),
            storage_key: self.storage_key.clone(),
            content_hash: self.content_hash.clone(),
            resource_type: s.resource_type.clone(),
            control_mappings: self.document.mappings.clone(),
        }
    }
}

/// Index projection of an evidence record, as returned by `list`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub created_at: String,
    pub resource: String,
    pub storage_key: String,
    pub content_hash: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub control_mappings: Vec<ControlMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_snapshot() -> PostureSnapshot {
        let mut facts = BTreeMap::new();
        facts.insert(
            "encryption".to_string(),
            json!({"ServerSideEncryptionConfiguration": {"Rules": [{"ApplyServerSideEncryptionByDefault": {"SSEAlgorithm": "aws:kms"}}]}}),
        );
        facts.insert("publicAccessBlock".to_string(), Value::Null);
        PostureSnapshot {
            resource_type: "aws.s3.bucket.posture".to_string(),
            account: "111122223333".to_string(),
            region: "us-east-1".to_string(),
            resource: "audit-logs".to_string(),
            captured_at: "2026-02-17T00:00:00Z".to_string(),
            facts,
        }
    }

    #[test]
    fn test_lookup_nested_and_null() {
        let snap = sample_snapshot();
        assert!(snap
            .lookup("encryption.ServerSideEncryptionConfiguration")
            .is_some());
        assert!(snap.lookup("publicAccessBlock").is_none());
        assert!(snap.lookup("publicAccessBlock.BlockPublicAcls").is_none());
        assert!(snap.lookup("missing").is_none());
    }

    #[test]
    fn test_status_serializes_explicitly() {
        let m = ControlMapping {
            framework: "PCI DSS".to_string(),
            control: "3.5.1".to_string(),
            evidence: "Storage encryption enabled".to_string(),
            status: MappingStatus::Pass,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["status"], "pass");
        for status in [MappingStatus::Pass, MappingStatus::Gap] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
    }

    #[test]
    fn test_document_value_shape() {
        let doc = EvidenceDocument::new(sample_snapshot(), vec![]);
        let v = doc.to_value().unwrap();
        assert_eq!(v["type"], "aws.s3.bucket.posture");
        assert_eq!(v["capturedAt"], "2026-02-17T00:00:00Z");
        assert!(v["publicAccessBlock"].is_null());
        assert!(v["controlMappings"].as_array().unwrap().is_empty());

        let back = EvidenceDocument::from_value(v).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_reserved_fact_name_rejected() {
        let mut snap = sample_snapshot();
        snap.facts.insert("region".to_string(), json!("eu-west-1"));
        let doc = EvidenceDocument::new(snap, vec![]);
        assert!(doc.to_value().is_err());
    }

    #[test]
    fn test_index_entry_field_names() {
        let entry = IndexEntry {
            id: "id-1".to_string(),
            created_at: "2026-02-17T00:00:00Z".to_string(),
            resource: "audit-logs".to_string(),
            storage_key: "evidence/a/r/s3/audit-logs/id-1.json".to_string(),
            content_hash: "00".repeat(32),
            resource_type: "aws.s3.bucket.posture".to_string(),
            control_mappings: vec![],
        };
        let v = serde_json::to_value(&entry).unwrap();
        for key in [
            "id",
            "createdAt",
            "resource",
            "storageKey",
            "contentHash",
            "type",
            "controlMappings",
        ] {
            assert!(v.get(key).is_some(), "missing {}", key);
        }
    }
}
