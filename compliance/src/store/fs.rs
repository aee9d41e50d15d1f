//! Local-directory blob store and index.
//!
//! Both backends stage writes in a temporary file and publish them with
//! `hard_link`, so readers never observe partial content and an existing
//! key or id is never replaced.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{BlobStore, EvidenceIndex, IndexPage};
use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::IndexEntry;

const STAGING_SUFFIX: &str = ".staging";

/// Blob store rooted at a directory; keys map to relative paths.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> ComplianceResult<PathBuf> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && !key.contains('\\')
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(ComplianceError::validation(format!(
                "blob key '{}' is not a relative path",
                key
            )));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> ComplianceResult<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| ComplianceError::validation(format!("blob key '{}' has no parent", key)))?;
        tokio::fs::create_dir_all(parent).await?;

        match publish_once(parent, &path, bytes).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ComplianceError::storage(
                format!("blob '{}' already exists", key),
            )),
            Err(e) => Err(ComplianceError::storage(format!(
                "cannot publish blob '{}': {}",
                key, e
            ))),
        }
    }

    async fn get(&self, key: &str) -> ComplianceResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> ComplianceResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(item) = reader.next_entry().await? {
                let path = item.path();
                if item.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let name = item.file_name();
                if name.to_string_lossy().ends_with(STAGING_SUFFIX) {
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Index stored as one JSON document per entry, named `{id}.json`.
pub struct FsIndex {
    dir: PathBuf,
    page_size: usize,
}

impl FsIndex {
    pub fn new(dir: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            dir: dir.into(),
            page_size: page_size.max(1),
        }
    }

    async fn sorted_ids(&self) -> ComplianceResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut reader = match tokio::fs::read_dir(&self.dir).await {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = reader.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl EvidenceIndex for FsIndex {
    async fn put(&self, entry: &IndexEntry) -> ComplianceResult<()> {
        if entry.id.is_empty() || entry.id.starts_with('.') || entry.id.contains(['/', '\\']) {
            return Err(ComplianceError::validation(format!(
                "index id '{}' is not a valid file name",
                entry.id
            )));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", entry.id));
        let bytes = serde_json::to_vec(entry)?;
        match publish_once(&self.dir, &path, &bytes).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ComplianceError::storage(
                format!("index entry '{}' already exists", entry.id),
            )),
            Err(e) => Err(ComplianceError::storage(format!(
                "cannot publish index entry '{}': {}",
                entry.id, e
            ))),
        }
    }

    async fn scan_page(&self, cursor: Option<&str>) -> ComplianceResult<IndexPage> {
        let ids = self.sorted_ids().await?;
        let remaining: Vec<&String> = ids
            .iter()
            .filter(|id| cursor.map_or(true, |c| id.as_str() > c))
            .collect();

        let mut entries = Vec::new();
        for id in remaining.iter().take(self.page_size) {
            let path = self.dir.join(format!("{}.json", id));
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            entries.push(serde_json::from_slice::<IndexEntry>(&bytes)?);
        }

        let next = if remaining.len() > self.page_size {
            remaining.get(self.page_size - 1).map(|id| id.to_string())
        } else {
            None
        };
        Ok(IndexPage { entries, next })
    }
}

/// Stage `bytes` in `dir`, then link the staged file to `path`. Fails with
/// `AlreadyExists` if `path` is taken. The staged file is always removed.
async fn publish_once(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let staging = dir.join(format!(".{}{}", Uuid::new_v4().simple(), STAGING_SUFFIX));
    let published = match write_synced(&staging, bytes).await {
        Ok(()) => tokio::fs::hard_link(&staging, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = tokio::fs::remove_file(&staging).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %staging.display(), error = %e, "cannot remove staging file");
        }
    }
    published
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn entry(id: &str) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            created_at: "2026-02-17T00:00:00Z".to_string(),
            resource: "b".to_string(),
            storage_key: format!("evidence/1/r/s3/b/{}.json", id),
            content_hash: "cd".repeat(32),
            resource_type: "aws.s3.bucket.posture".to_string(),
            control_mappings: vec![],
        }
    }

    #[tokio::test]
    async fn test_blob_round_trip_and_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("evidence/1/r/s3/b/x.json", b"{}").await.unwrap();
        assert_eq!(
            store.get("evidence/1/r/s3/b/x.json").await.unwrap().unwrap(),
            b"{}"
        );
        assert!(store.put("evidence/1/r/s3/b/x.json", b"[]").await.is_err());
        assert_eq!(
            store.get("evidence/1/r/s3/b/x.json").await.unwrap().unwrap(),
            b"{}"
        );
        assert!(store.get("evidence/none.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_list_skips_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("evidence/a/1.json", b"1").await.unwrap();
        store.put("exports/manifest-1.json", b"2").await.unwrap();
        std::fs::write(dir.path().join("evidence/a/.tmp.staging"), b"x").unwrap();
        assert_eq!(
            store.list("evidence/").await.unwrap(),
            vec!["evidence/a/1.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_blob_key_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.put("../escape.json", b"x").await.is_err());
        assert!(store.put("/abs.json", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_index_pagination_covers_everything() {
        let dir = tempfile::tempdir().unwrap();
        let index = FsIndex::new(dir.path().join("index"), 2);
        for i in 0..5 {
            index.put(&entry(&format!("id{}", i))).await.unwrap();
        }
        let first = index.scan_page(None).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next.as_deref(), Some("id1"));

        let all = index.scan().await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[4], entry("id4"));
    }

    #[tokio::test]
    async fn test_index_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = FsIndex::new(dir.path().join("absent"), 10);
        assert!(index.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_duplicate_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = FsIndex::new(dir.path(), 10);
        index.put(&entry("dup")).await.unwrap();
        assert!(index.put(&entry("dup")).await.is_err());
    }

    fn staging_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(STAGING_SUFFIX))
            .collect()
    }

    #[tokio::test]
    async fn test_rejected_writes_leave_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = FsIndex::new(dir.path().join("index"), 10);
        index.put(&entry("dup")).await.unwrap();
        assert!(index.put(&entry("dup")).await.is_err());
        assert!(staging_files(&dir.path().join("index")).is_empty());

        let store = FsBlobStore::new(dir.path().join("blobs"));
        store.put("evidence/a/1.json", b"1").await.unwrap();
        assert!(store.put("evidence/a/1.json", b"2").await.is_err());
        assert!(staging_files(&dir.path().join("blobs/evidence/a")).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_same_id_publish_once() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(FsIndex::new(dir.path().join("index"), 10));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let index = index.clone();
            tasks.spawn(async move {
                let mut e = entry("race");
                e.resource = format!("writer-{}", i);
                index.put(&e).await.is_ok()
            });
        }
        let mut published = 0;
        while let Some(ok) = tasks.join_next().await {
            if ok.unwrap() {
                published += 1;
            }
        }
        assert_eq!(published, 1);

        let entries = index.scan().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].resource.starts_with("writer-"));
        assert!(staging_files(&dir.path().join("index")).is_empty());
    }
}
