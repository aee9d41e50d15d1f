//! Evidence record builder: canonical bytes, content hash, id and storage key.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use super::canonical::{sha256_hex, to_canonical_bytes};
use super::{ControlMapping, EvidenceDocument, EvidenceRecord, PostureSnapshot};
use crate::error::{ComplianceError, ComplianceResult};
use crate::inventory::ResourceKind;

/// Blob key prefix under which all evidence records live.
pub const EVIDENCE_PREFIX: &str = "evidence/";

/// Current UTC time as RFC 3339 with second precision and a `Z` suffix.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Assembles snapshots and mappings into identified, hashed records.
pub struct EvidenceRecordBuilder {
    kind: ResourceKind,
}

impl EvidenceRecordBuilder {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    /// Build a record with a fresh UUID v4 identifier.
    pub fn build(
        &self,
        snapshot: PostureSnapshot,
        mappings: Vec<ControlMapping>,
    ) -> ComplianceResult<EvidenceRecord> {
        self.build_with_id(Uuid::new_v4().to_string(), snapshot, mappings)
    }

    /// Build a record with a caller-supplied identifier.
    ///
    /// Used by the reindexer, which recovers ids from blob keys.
    pub fn build_with_id(
        &self,
        id: String,
        snapshot: PostureSnapshot,
        mappings: Vec<ControlMapping>,
    ) -> ComplianceResult<EvidenceRecord> {
        if snapshot.resource_type != self.kind.type_tag {
            return Err(ComplianceError::validation(format!(
                "snapshot type '{}' does not match builder kind '{}'",
                snapshot.resource_type, self.kind.type_tag
            )));
        }
        validate_segment("id", &id)?;

        let document = EvidenceDocument::new(snapshot, mappings);
        let storage_key = storage_key(&self.kind, &document.snapshot, &id)?;
        let bytes = to_canonical_bytes(&document.to_value()?)?;
        let content_hash = sha256_hex(&bytes);

        Ok(EvidenceRecord::from_parts(
            id,
            document,
            content_hash,
            storage_key,
            bytes,
        ))
    }
}

/// `evidence/{account}/{region}/{resourceType}/{resourceName}/{id}.json`
pub fn storage_key(
    kind: &ResourceKind,
    snapshot: &PostureSnapshot,
    id: &str,
) -> ComplianceResult<String> {
    validate_segment("account", &snapshot.account)?;
    validate_segment("region", &snapshot.region)?;
    validate_segment("resource type", &kind.key_segment)?;
    validate_segment("resource", &snapshot.resource)?;
    validate_segment("id", id)?;
    Ok(format!(
        "{}{}/{}/{}/{}/{}.json",
        EVIDENCE_PREFIX, snapshot.account, snapshot.region, kind.key_segment, snapshot.resource, id
    ))
}

/// Key segments must be non-empty path components that cannot escape their
/// directory.
fn validate_segment(field: &str, value: &str) -> ComplianceResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(ComplianceError::validation(format!(
            "{} '{}' is not a valid storage key segment",
            field, value
        )));
    }
    Ok(())
}
