//! Integration tests for the compliance crate.
//!
//! These tests exercise the full pipeline over the filesystem backends:
//! collect posture, map controls, persist evidence, list, verify, reindex and
//! export.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use postureledger_compliance::collector::{Collector, CollectorIdentity, RetryPolicy};
use postureledger_compliance::controls::{MappingEngine, RuleTable};
use postureledger_compliance::evidence::canonical::sha256_hex;
use postureledger_compliance::evidence::schema::decode_record;
use postureledger_compliance::evidence::{IndexEntry, MappingStatus};
use postureledger_compliance::export::json_export;
use postureledger_compliance::export::{ExportService, LinkSigner};
use postureledger_compliance::inventory::fixture::StaticInventory;
use postureledger_compliance::inventory::ResourceKind;
use postureledger_compliance::store::fs::{FsBlobStore, FsIndex};
use postureledger_compliance::store::{BlobStore, EvidenceStore};
use postureledger_compliance::ComplianceError;
use rand::rngs::OsRng;

const INVENTORY: &str = r#"{"resources": [
  {"type": "aws.s3.bucket.posture", "name": "audit-logs",
   "attributes": {
     "encryption": {"ServerSideEncryptionConfiguration": {"Rules": [
       {"ApplyServerSideEncryptionByDefault": {"SSEAlgorithm": "aws:kms"}}]}},
     "publicAccessBlock": {"BlockPublicAcls": true, "IgnorePublicAcls": true,
                           "BlockPublicPolicy": true, "RestrictPublicBuckets": true}}},
  {"type": "aws.s3.bucket.posture", "name": "scratch",
   "attributes": {
     "publicAccessBlock": {"BlockPublicAcls": true, "IgnorePublicAcls": false,
                           "BlockPublicPolicy": true, "RestrictPublicBuckets": true}}},
  {"type": "aws.s3.bucket.posture", "name": "legacy"}
]}"#;

fn fs_store(root: &Path, page_size: usize) -> EvidenceStore {
    EvidenceStore::new(
        Arc::new(FsBlobStore::new(root.join("blobs"))),
        Arc::new(FsIndex::new(root.join("index"), page_size)),
    )
}

fn collector(store: EvidenceStore) -> Collector {
    Collector::new(
        Arc::new(StaticInventory::from_json(INVENTORY).unwrap()),
        ResourceKind::s3_bucket(),
        MappingEngine::new(RuleTable::builtin().unwrap()),
        store,
        CollectorIdentity {
            account: "111122223333".to_string(),
            region: "us-east-1".to_string(),
        },
    )
    .with_retry(RetryPolicy::immediate(2))
}

fn statuses(entry: &IndexEntry) -> Vec<(String, MappingStatus)> {
    entry
        .control_mappings
        .iter()
        .map(|m| (format!("{} {}", m.framework, m.control), m.status))
        .collect()
}

#[tokio::test]
async fn test_full_pipeline_collect_list_verify() {
    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path(), 2);

    let summary = collector(store.clone()).run().await;
    assert!(summary.is_clean(), "unexpected failures: {:?}", summary.failed);
    assert_eq!(summary.created.len(), 3);

    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 3);

    let by_resource = |name: &str| entries.iter().find(|e| e.resource == name).unwrap();

    assert_eq!(
        statuses(by_resource("audit-logs")),
        vec![
            ("ISO27001 A.5.15".to_string(), MappingStatus::Pass),
            ("ISO27001 A.8.24".to_string(), MappingStatus::Pass),
            ("PCI DSS 3.5.1".to_string(), MappingStatus::Pass),
        ]
    );
    assert_eq!(
        statuses(by_resource("scratch")),
        vec![
            ("ISO27001 A.5.15".to_string(), MappingStatus::Gap),
            ("ISO27001 A.8.24".to_string(), MappingStatus::Gap),
            ("PCI DSS 3.5.1".to_string(), MappingStatus::Gap),
        ]
    );

    for created in &summary.created {
        let report = store.verify(&created.id).await.unwrap();
        assert!(report.intact);
        assert_eq!(report.recorded_hash, created.hash);

        let bytes = store.blobs().get(&created.key).await.unwrap().unwrap();
        assert_eq!(sha256_hex(&bytes), created.hash);
        let doc = decode_record(&bytes).unwrap();
        assert_eq!(doc.snapshot.account, "111122223333");
    }

    let legacy = by_resource("legacy");
    let bytes = store.blobs().get(&legacy.storage_key).await.unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(json["encryption"].is_null());
    assert!(json["publicAccessBlock"].is_null());
    assert!(legacy
        .storage_key
        .starts_with("evidence/111122223333/us-east-1/s3/legacy/"));
}

#[tokio::test]
async fn test_second_run_appends_new_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path(), 10);

    let first = collector(store.clone()).run().await;
    let second = collector(store.clone()).run().await;
    assert_eq!(first.created.len(), 3);
    assert_eq!(second.created.len(), 3);
    assert_eq!(store.list().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_reindex_recovers_from_lost_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path(), 10);
    let summary = collector(store.clone()).run().await;

    std::fs::remove_dir_all(dir.path().join("index")).unwrap();
    assert!(store.list().await.unwrap().is_empty());

    let report = store.reindex().await.unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.restored, 3);

    let mut restored: Vec<String> = store.list().await.unwrap().into_iter().map(|e| e.id).collect();
    let mut created: Vec<String> = summary.created.into_iter().map(|c| c.id).collect();
    restored.sort();
    created.sort();
    assert_eq!(restored, created);
}

#[tokio::test]
async fn test_verify_detects_modified_blob_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path(), 10);
    let summary = collector(store.clone()).run().await;
    let target = &summary.created[0];

    let path = dir.path().join("blobs").join(&target.key);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.push(b' ');
    std::fs::remove_file(&path).unwrap();
    std::fs::write(&path, bytes).unwrap();

    let report = store.verify(&target.id).await.unwrap();
    assert!(!report.intact);
}

#[tokio::test]
async fn test_export_manifest_over_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path(), 2);
    let summary = collector(store.clone()).run().await;

    let service = ExportService::new(
        store.clone(),
        LinkSigner::new(SigningKey::generate(&mut OsRng)),
        Duration::from_secs(600),
        "https://ledger.example",
    );

    let ids: Vec<String> = summary.created.iter().take(2).map(|c| c.id.clone()).collect();
    let desc = service.export(&ids).await.unwrap();
    assert_eq!(desc.count, 2);
    assert!(desc.export_url.starts_with("https://ledger.example/exports/manifest-"));

    let manifest = store.blobs().get(&desc.manifest_key).await.unwrap().unwrap();
    let entries = json_export::from_json(&manifest).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| ids.contains(&e.id)));

    // Exports do not appear as evidence.
    assert_eq!(store.list().await.unwrap().len(), 3);
    assert_eq!(store.reindex().await.unwrap().scanned, 3);

    let err = service.export(&["missing".to_string()]).await.unwrap_err();
    assert!(matches!(err, ComplianceError::NotFound { .. }));
}

#[tokio::test]
async fn test_fs_blob_store_is_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path());
    blobs.put("exports/manifest-1-aaaa.json", b"[]").await.unwrap();
    assert!(blobs.put("exports/manifest-1-aaaa.json", b"[1]").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listing_during_concurrent_runs_sees_only_complete_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = fs_store(dir.path(), 2);
    let finished = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = store.clone();
        let finished = finished.clone();
        tokio::spawn(async move {
            let mut passes = 0;
            loop {
                let last = finished.load(Ordering::SeqCst);
                for entry in store.list().await.unwrap() {
                    let blob = store.blobs().get(&entry.storage_key).await.unwrap();
                    assert!(blob.is_some(), "index entry {} has no blob", entry.id);
                    let report = store.verify(&entry.id).await.unwrap();
                    assert!(report.intact, "record {} failed verification", entry.id);
                }
                passes += 1;
                if last {
                    return passes;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut writers = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let collector = collector(store.clone()).with_concurrency(3);
        writers.spawn(async move { collector.run().await });
    }
    while let Some(summary) = writers.join_next().await {
        assert!(summary.unwrap().is_clean());
    }
    finished.store(true, Ordering::SeqCst);

    assert!(reader.await.unwrap() >= 1);
    assert_eq!(store.list().await.unwrap().len(), 12);
}
