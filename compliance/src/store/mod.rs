//! Append-only evidence store: a blob store holding canonical record bytes
//! (the source of truth) and an index holding listable summaries.
//!
//! Write protocol per record: blob first, then index entry. If the index write
//! fails the blob is left as an orphan; [`EvidenceStore::reindex`] restores
//! missing index entries by re-reading blobs.

pub mod fs;
pub mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::builder::EVIDENCE_PREFIX;
use crate::evidence::canonical::sha256_hex;
use crate::evidence::schema::{decode_record, verify_record_bytes};
use crate::evidence::{EvidenceRecord, IndexEntry};

/// Write-once key/value blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`. Fails if `key` already exists.
    async fn put(&self, key: &str, bytes: &[u8]) -> ComplianceResult<()>;

    /// Fetch the bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> ComplianceResult<Option<Vec<u8>>>;

    /// All keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> ComplianceResult<Vec<String>>;
}

/// One page of an index scan.
#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    pub entries: Vec<IndexEntry>,
    /// Exclusive start cursor for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Paginated, insert-only index of evidence summaries.
#[async_trait]
pub trait EvidenceIndex: Send + Sync {
    async fn put(&self, entry: &IndexEntry) -> ComplianceResult<()>;

    /// Read the page that starts after `cursor` (or at the beginning).
    async fn scan_page(&self, cursor: Option<&str>) -> ComplianceResult<IndexPage>;

    /// Follow cursors until exhausted, merging pages into one result with no
    /// duplicate ids.
    async fn scan(&self) -> ComplianceResult<Vec<IndexEntry>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.scan_page(cursor.as_deref()).await?;
            for entry in page.entries {
                if seen.insert(entry.id.clone()) {
                    out.push(entry);
                }
            }
            match page.next {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                Some(_) => {
                    return Err(ComplianceError::storage(
                        "index scan cursor did not advance",
                    ))
                }
                None => break,
            }
        }
        Ok(out)
    }
}

/// Why persisting one record failed.
#[derive(Error, Debug)]
pub enum WriteFailure {
    /// Nothing was written.
    #[error("blob write failed: {0}")]
    Blob(ComplianceError),
    /// The blob exists but is not indexed yet.
    #[error("index write failed, blob '{orphaned_key}' orphaned: {error}")]
    Index {
        orphaned_key: String,
        error: ComplianceError,
    },
}

/// Result of checking one stored record against its recorded hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub id: String,
    pub storage_key: String,
    pub recorded_hash: String,
    pub computed_hash: String,
    pub intact: bool,
}

/// Outcome of a reindex pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReindexReport {
    /// Evidence blobs examined.
    pub scanned: usize,
    /// Index entries written for previously orphaned blobs.
    pub restored: usize,
    /// Blobs that could not be decoded or indexed.
    pub skipped: Vec<String>,
}

/// Blob store and index, used together.
#[derive(Clone)]
pub struct EvidenceStore {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn EvidenceIndex>,
}

impl EvidenceStore {
    pub fn new(blobs: Arc<dyn BlobStore>, index: Arc<dyn EvidenceIndex>) -> Self {
        Self { blobs, index }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Write the record's canonical bytes, then its index entry.
    pub async fn persist(&self, record: &EvidenceRecord) -> Result<(), WriteFailure> {
        self.blobs
            .put(&record.storage_key, record.canonical_bytes())
            .await
            .map_err(WriteFailure::Blob)?;

        if let Err(error) = self.index.put(&record.index_entry()).await {
            tracing::warn!(
                id = %record.id,
                key = %record.storage_key,
                error = %error,
                "index write failed; blob left for reindex"
            );
            return Err(WriteFailure::Index {
                orphaned_key: record.storage_key.clone(),
                error,
            });
        }
        Ok(())
    }

    /// Full merged index.
    pub async fn list(&self) -> ComplianceResult<Vec<IndexEntry>> {
        self.index.scan().await
    }

    /// Recompute the hash of the blob behind index entry `id`.
    pub async fn verify(&self, id: &str) -> ComplianceResult<VerifyReport> {
        let entry = self
            .list()
            .await?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| ComplianceError::not_found(format!("no index entry for '{}'", id)))?;

        let bytes = self.blobs.get(&entry.storage_key).await?.ok_or_else(|| {
            ComplianceError::not_found(format!("blob '{}' is missing", entry.storage_key))
        })?;

        let computed_hash = sha256_hex(&bytes);
        let intact = verify_record_bytes(&bytes, &entry.content_hash).is_ok();
        Ok(VerifyReport {
            id: entry.id,
            storage_key: entry.storage_key,
            recorded_hash: entry.content_hash,
            computed_hash,
            intact,
        })
    }

    /// Write index entries for evidence blobs the index does not know about.
    pub async fn reindex(&self) -> ComplianceResult<ReindexReport> {
        let known: HashSet<String> = self
            .list()
            .await?
            .into_iter()
            .map(|e| e.storage_key)
            .collect();

        let mut report = ReindexReport::default();
        for key in self.blobs.list(EVIDENCE_PREFIX).await? {
            report.scanned += 1;
            if known.contains(&key) {
                continue;
            }
            match self.restore_entry(&key).await {
                Ok(()) => {
                    tracing::info!(key = %key, "restored index entry for orphaned blob");
                    report.restored += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cannot restore index entry");
                    report.skipped.push(key);
                }
            }
        }
        Ok(report)
    }

    async fn restore_entry(&self, key: &str) -> ComplianceResult<()> {
        let id = key
            .rsplit('/')
            .next()
            .and_then(|name| name.strip_suffix(".json"))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ComplianceError::validation(format!("unrecognized key '{}'", key)))?
            .to_string();

        let bytes = self
            .blobs
            .get(key)
            .await?
            .ok_or_else(|| ComplianceError::not_found(format!("blob '{}' vanished", key)))?;
        let document = decode_record(&bytes)?;
        let snapshot = document.snapshot;

        let entry = IndexEntry {
            id,
            created_at: snapshot.captured_at,
            resource: snapshot.resource,
            storage_key: key.to_string(),
            content_hash: sha256_hex(&bytes),
            resource_type: snapshot.resource_type,
            control_mappings: document.mappings,
        };
        self.index.put(&entry).await
    }
}
