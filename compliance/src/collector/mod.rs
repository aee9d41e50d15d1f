//! Posture collector: one pass over every resource of a kind.
//!
//! For each enumerated resource the collector fetches each optional attribute
//! group, evaluates the rule table, builds an evidence record and persists it.
//! Resources are independent; a failure on one is reported in the
//! [`RunSummary`] and the pass continues.

pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::controls::MappingEngine;
use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::builder::{now_timestamp, EvidenceRecordBuilder};
use crate::evidence::PostureSnapshot;
use crate::inventory::{AttributeFetch, InventoryError, InventorySource, ResourceKind, ResourceRef};
use crate::store::{EvidenceStore, WriteFailure};
pub use retry::RetryPolicy;

/// Resource name used in the summary when enumeration itself fails.
pub const ENUMERATION_TARGET: &str = "*";

/// Where in the pipeline a resource failed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Enumerate,
    Collect,
    Build,
    Blob,
    Index,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedItem {
    pub id: String,
    pub resource: String,
    pub key: String,
    pub hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub resource: String,
    pub stage: FailureStage,
    pub error: String,
    /// Set when the blob was written but the index entry was not.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orphaned_key: Option<String>,
}

/// Created and failed items of one collector pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: Vec<CreatedItem>,
    pub failed: Vec<FailedItem>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Account and region recorded on every snapshot of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorIdentity {
    pub account: String,
    pub region: String,
}

/// Runs one collection pass. Cheap to clone; all components are shared.
#[derive(Clone)]
pub struct Collector {
    inventory: Arc<dyn InventorySource>,
    kind: Arc<ResourceKind>,
    engine: Arc<MappingEngine>,
    builder: Arc<EvidenceRecordBuilder>,
    store: EvidenceStore,
    identity: Arc<CollectorIdentity>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl Collector {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        kind: ResourceKind,
        engine: MappingEngine,
        store: EvidenceStore,
        identity: CollectorIdentity,
    ) -> Self {
        Self {
            inventory,
            builder: Arc::new(EvidenceRecordBuilder::new(kind.clone())),
            kind: Arc::new(kind),
            engine: Arc::new(engine),
            store,
            identity: Arc::new(identity),
            retry: RetryPolicy::default(),
            concurrency: 4,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Maximum resources processed at once. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Build the posture snapshot of one resource.
    ///
    /// Absent attribute groups are recorded as `null`. Errors only when an
    /// attribute fetch keeps failing transiently after all retries.
    pub async fn collect(&self, resource: &ResourceRef) -> ComplianceResult<PostureSnapshot> {
        let mut facts = BTreeMap::new();
        for group in &self.kind.attribute_groups {
            let value = self.fetch_with_retry(resource, group).await?;
            facts.insert(group.clone(), value);
        }
        Ok(PostureSnapshot {
            resource_type: self.kind.type_tag.clone(),
            account: self.identity.account.clone(),
            region: self.identity.region.clone(),
            resource: resource.name.clone(),
            captured_at: now_timestamp(),
            facts,
        })
    }

    async fn fetch_with_retry(&self, resource: &ResourceRef, group: &str) -> ComplianceResult<Value> {
        let attempts = self.retry.attempts();
        let mut last_reason = String::new();
        for attempt in 0..attempts {
            match self
                .inventory
                .fetch_attribute(&self.kind, resource, group)
                .await
            {
                AttributeFetch::Present(value) => return Ok(value),
                AttributeFetch::Absent => {
                    tracing::debug!(resource = %resource.name, group, "attribute absent");
                    return Ok(Value::Null);
                }
                AttributeFetch::Transient(reason) => {
                    tracing::warn!(
                        resource = %resource.name,
                        group,
                        attempt = attempt + 1,
                        reason = %reason,
                        "transient attribute fetch failure"
                    );
                    last_reason = reason;
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        Err(ComplianceError::fetch(format!(
            "{} for '{}' failed after {} attempts: {}",
            group, resource.name, attempts, last_reason
        )))
    }

    async fn enumerate_with_retry(&self) -> Result<Vec<ResourceRef>, InventoryError> {
        let attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            match self.inventory.enumerate(&self.kind).await {
                Ok(resources) => return Ok(resources),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "enumeration failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Collect, evaluate, build and persist a single resource.
    async fn process(&self, resource: ResourceRef) -> Result<CreatedItem, FailedItem> {
        let fail = |stage, error: String, orphaned_key| FailedItem {
            resource: resource.name.clone(),
            stage,
            error,
            orphaned_key,
        };

        let snapshot = self
            .collect(&resource)
            .await
            .map_err(|e| fail(FailureStage::Collect, e.to_string(), None))?;
        let mappings = self.engine.evaluate(&snapshot);
        for m in &mappings {
            tracing::debug!(
                resource = %resource.name,
                framework = %m.framework,
                control = %m.control,
                status = m.status.as_str(),
                "control evaluated"
            );
        }
        let record = self
            .builder
            .build(snapshot, mappings)
            .map_err(|e| fail(FailureStage::Build, e.to_string(), None))?;

        match self.store.persist(&record).await {
            Ok(()) => Ok(CreatedItem {
                id: record.id.clone(),
                resource: resource.name.clone(),
                key: record.storage_key.clone(),
                hash: record.content_hash.clone(),
            }),
            Err(WriteFailure::Blob(e)) => Err(fail(FailureStage::Blob, e.to_string(), None)),
            Err(WriteFailure::Index {
                orphaned_key,
                error,
            }) => Err(fail(FailureStage::Index, error.to_string(), Some(orphaned_key))),
        }
    }

    /// One full pass. Never fails as a whole; every problem is itemized.
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        let resources = match self.enumerate_with_retry().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(kind = %self.kind.type_tag, error = %e, "enumeration failed");
                summary.failed.push(FailedItem {
                    resource: ENUMERATION_TARGET.to_string(),
                    stage: FailureStage::Enumerate,
                    error: e.to_string(),
                    orphaned_key: None,
                });
                return summary;
            }
        };
        tracing::info!(
            kind = %self.kind.type_tag,
            count = resources.len(),
            concurrency = self.concurrency,
            "collection pass started"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for resource in resources {
            let this = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let name = resource.name.clone();
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => this.process(resource).await,
                    Err(_) => Err(FailedItem {
                        resource: name.clone(),
                        stage: FailureStage::Collect,
                        error: "collector shut down".to_string(),
                        orphaned_key: None,
                    }),
                };
                (name, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(created))) => {
                    tracing::info!(resource = %created.resource, id = %created.id, "evidence recorded");
                    summary.created.push(created);
                }
                Ok((_, Err(failed))) => {
                    tracing::warn!(
                        resource = %failed.resource,
                        stage = ?failed.stage,
                        error = %failed.error,
                        "resource failed"
                    );
                    summary.failed.push(failed);
                }
                Err(e) => {
                    tracing::error!(error = %e, "collector task aborted");
                    summary.failed.push(FailedItem {
                        resource: ENUMERATION_TARGET.to_string(),
                        stage: FailureStage::Collect,
                        error: format!("task aborted: {}", e),
                        orphaned_key: None,
                    });
                }
            }
        }

        summary.created.sort_by(|a, b| a.resource.cmp(&b.resource));
        summary.failed.sort_by(|a, b| a.resource.cmp(&b.resource));
        tracing::info!(
            created = summary.created.len(),
            failed = summary.failed.len(),
            "collection pass finished"
        );
        summary
    }
}
