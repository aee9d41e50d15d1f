//! Query and export over the evidence index.
//!
//! An export writes a manifest blob (the selected index entries, in list
//! order) under a fresh key and hands back a signed link that expires after
//! the configured TTL.

pub mod json_export;
pub mod signing;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::canonical::sha256_hex;
use crate::evidence::IndexEntry;
use crate::store::EvidenceStore;
pub use signing::LinkSigner;

/// Blob key prefix for export manifests.
pub const EXPORT_PREFIX: &str = "exports/";

/// Default lifetime of a manifest link.
pub const DEFAULT_LINK_TTL_SECS: u64 = 3600;

/// What an export produced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDescriptor {
    pub export_url: String,
    pub count: usize,
    pub manifest_key: String,
    pub manifest_hash: String,
    /// Unix seconds after which the link is rejected.
    pub expires_at: i64,
}

pub struct ExportService {
    store: EvidenceStore,
    signer: LinkSigner,
    link_ttl: Duration,
    public_base_url: String,
}

impl ExportService {
    pub fn new(
        store: EvidenceStore,
        signer: LinkSigner,
        link_ttl: Duration,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            signer,
            link_ttl,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &EvidenceStore {
        &self.store
    }

    /// The full merged index.
    pub async fn list(&self) -> ComplianceResult<Vec<IndexEntry>> {
        self.store.list().await
    }

    pub async fn export(&self, ids: &[String]) -> ComplianceResult<ExportDescriptor> {
        self.export_at(ids, chrono::Utc::now().timestamp()).await
    }

    /// Export as of `now` (unix seconds).
    pub async fn export_at(&self, ids: &[String], now: i64) -> ComplianceResult<ExportDescriptor> {
        if ids.is_empty() {
            return Err(ComplianceError::validation("Provide evidenceIds: []"));
        }
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let selected: Vec<IndexEntry> = self
            .list()
            .await?
            .into_iter()
            .filter(|e| wanted.contains(e.id.as_str()))
            .collect();
        if selected.is_empty() {
            return Err(ComplianceError::not_found("No matching evidence found"));
        }

        let bytes = json_export::to_json(&selected)?;
        let manifest_key = manifest_key(now);
        self.store.blobs().put(&manifest_key, &bytes).await?;

        let ttl = i64::try_from(self.link_ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl);
        let export_url = self.signed_url(&manifest_key, expires_at);
        tracing::info!(
            key = %manifest_key,
            count = selected.len(),
            expires_at,
            "export manifest written"
        );

        Ok(ExportDescriptor {
            export_url,
            count: selected.len(),
            manifest_hash: sha256_hex(&bytes),
            manifest_key,
            expires_at,
        })
    }

    fn signed_url(&self, manifest_key: &str, expires: i64) -> String {
        let file = manifest_key
            .strip_prefix(EXPORT_PREFIX)
            .unwrap_or(manifest_key);
        format!(
            "{}/exports/{}?expires={}&signature={}",
            self.public_base_url,
            file,
            expires,
            self.signer.sign_link(manifest_key, expires)
        )
    }

    pub async fn fetch_manifest(
        &self,
        file: &str,
        expires: i64,
        signature: &str,
    ) -> ComplianceResult<Vec<u8>> {
        self.fetch_manifest_at(file, expires, signature, chrono::Utc::now().timestamp())
            .await
    }

    /// Resolve a signed link to manifest bytes. Signature and expiry are
    /// checked before the store is consulted.
    pub async fn fetch_manifest_at(
        &self,
        file: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> ComplianceResult<Vec<u8>> {
        if file.is_empty() || file.contains(['/', '\\']) || file.starts_with('.') {
            return Err(ComplianceError::not_found("Not found"));
        }
        let key = format!("{}{}", EXPORT_PREFIX, file);
        self.signer.verify_link(&key, expires, signature, now)?;
        self.store
            .blobs()
            .get(&key)
            .await?
            .ok_or_else(|| ComplianceError::not_found(format!("manifest '{}' not found", file)))
    }
}

/// `exports/manifest-{unixSeconds}-{suffix}.json` with an 8-hex random suffix.
fn manifest_key(now: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}manifest-{}-{}.json", EXPORT_PREFIX, now, &suffix[..8])
}
