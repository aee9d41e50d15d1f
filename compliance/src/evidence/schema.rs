//! Independent verification of stored evidence bytes.

use super::canonical::{sha256_hex, to_canonical_bytes};
use super::EvidenceDocument;
use crate::error::{ComplianceError, ComplianceResult};

/// Check that `bytes` hash to `expected_hash`.
pub fn verify_record_bytes(bytes: &[u8], expected_hash: &str) -> ComplianceResult<()> {
    if expected_hash.len() != 64 || !expected_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ComplianceError::integrity(format!(
            "recorded hash '{}' is not a 64-character hex digest",
            expected_hash
        )));
    }
    let computed = sha256_hex(bytes);
    if !computed.eq_ignore_ascii_case(expected_hash) {
        return Err(ComplianceError::integrity(format!(
            "hash mismatch: computed {} != recorded {}",
            computed, expected_hash
        )));
    }
    Ok(())
}

/// Parse stored evidence bytes back into a document.
///
/// Rejects blobs that are not in canonical form, so that re-serializing the
/// returned document reproduces `bytes` exactly.
pub fn decode_record(bytes: &[u8]) -> ComplianceResult<EvidenceDocument> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let reencoded = to_canonical_bytes(&value)?;
    if reencoded != bytes {
        return Err(ComplianceError::integrity(
            "stored evidence is not in canonical form",
        ));
    }
    EvidenceDocument::from_value(value)
}
