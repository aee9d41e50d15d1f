//! JSON encoding for export manifests.

use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::IndexEntry;

/// Serialize manifest entries to pretty-printed JSON, preserving order.
pub fn to_json(entries: &[IndexEntry]) -> ComplianceResult<Vec<u8>> {
    serde_json::to_vec_pretty(entries).map_err(|e| {
        ComplianceError::serialization(format!("manifest serialization failed: {}", e))
    })
}

/// Parse manifest bytes back into entries.
pub fn from_json(bytes: &[u8]) -> ComplianceResult<Vec<IndexEntry>> {
    serde_json::from_slice(bytes).map_err(|e| {
        ComplianceError::serialization(format!("manifest deserialization failed: {}", e))
    })
}
