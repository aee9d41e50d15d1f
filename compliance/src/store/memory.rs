//! In-memory blob store and index, with failure injection for tests.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, EvidenceIndex, IndexPage};
use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::IndexEntry;

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_pattern: Option<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `put` whose key contains `pattern`.
    pub fn with_failure(mut self, pattern: &str) -> Self {
        self.fail_pattern = Some(pattern.to_string());
        self
    }

    /// Replace stored bytes, bypassing the write-once check.
    #[cfg(test)]
    pub(crate) async fn overwrite_for_test(&self, key: &str, bytes: Vec<u8>) {
        self.blobs.write().await.insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> ComplianceResult<()> {
        if let Some(pattern) = &self.fail_pattern {
            if key.contains(pattern.as_str()) {
                return Err(ComplianceError::storage(format!(
                    "simulated blob failure for '{}'",
                    key
                )));
            }
        }
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(key) {
            return Err(ComplianceError::storage(format!(
                "blob '{}' already exists",
                key
            )));
        }
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> ComplianceResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> ComplianceResult<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Index ordered by id, served in pages of `page_size`.
pub struct MemoryIndex {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
    page_size: usize,
    fail_resource: Option<String>,
}

impl MemoryIndex {
    pub fn new(page_size: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            fail_resource: None,
        }
    }

    /// Fail every `put` for entries whose resource is `resource`.
    pub fn with_failure(mut self, resource: &str) -> Self {
        self.fail_resource = Some(resource.to_string());
        self
    }
}

#[async_trait]
impl EvidenceIndex for MemoryIndex {
    async fn put(&self, entry: &IndexEntry) -> ComplianceResult<()> {
        if self.fail_resource.as_deref() == Some(entry.resource.as_str()) {
            return Err(ComplianceError::storage(format!(
                "simulated index failure for '{}'",
                entry.resource
            )));
        }
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.id) {
            return Err(ComplianceError::storage(format!(
                "index entry '{}' already exists",
                entry.id
            )));
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn scan_page(&self, cursor: Option<&str>) -> ComplianceResult<IndexPage> {
        let entries = self.entries.read().await;
        let start = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Unbounded,
        };
        let mut iter = entries.range((start, Bound::Unbounded));
        let page: Vec<IndexEntry> = iter
            .by_ref()
            .take(self.page_size)
            .map(|(_, e)| e.clone())
            .collect();
        let next = match (iter.next(), page.last()) {
            (Some(_), Some(last)) => Some(last.id.clone()),
            _ => None,
        };
        Ok(IndexPage {
            entries: page,
            next,
        })
    }
}
