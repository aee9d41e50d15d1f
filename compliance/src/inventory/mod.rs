//! Resource inventory seam.
//!
//! The inventory source enumerates target resources of one kind and answers
//! attribute-group queries about each. Cloud-provider clients plug in behind
//! [`InventorySource`]; [`fixture::StaticInventory`] serves a JSON document and
//! is what the CLI and tests use.

pub mod fixture;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Describes one collectable resource kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    /// Evidence type tag (e.g. "aws.s3.bucket.posture").
    pub type_tag: String,
    /// Short name used as the `{resourceType}` segment of blob keys.
    pub key_segment: String,
    /// Optional attribute groups fetched for every resource, in fetch order.
    pub attribute_groups: Vec<String>,
}

impl ResourceKind {
    /// Object-storage bucket posture: encryption and public-access-block settings.
    pub fn s3_bucket() -> Self {
        Self {
            type_tag: "aws.s3.bucket.posture".to_string(),
            key_segment: "s3".to_string(),
            attribute_groups: vec!["encryption".to_string(), "publicAccessBlock".to_string()],
        }
    }

    /// Look up a builtin kind by type tag or key segment.
    pub fn by_name(name: &str) -> Option<Self> {
        let s3 = Self::s3_bucket();
        if name == s3.type_tag || name == s3.key_segment {
            Some(s3)
        } else {
            None
        }
    }
}

/// A handle to one enumerated resource.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub name: String,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Outcome of fetching one optional attribute group.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeFetch {
    /// The attribute is configured; the value is recorded verbatim.
    Present(Value),
    /// Not configured, not permitted, or the resource vanished. Not an error.
    Absent,
    /// Network or throttling failure; the caller may retry.
    Transient(String),
}

/// Failure of the enumeration call itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Network or throttling failure; retryable.
    #[error("transient inventory failure: {0}")]
    Transient(String),
    /// Credentials lack permission to enumerate. Not retried.
    #[error("inventory access denied: {0}")]
    Denied(String),
}

impl InventoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Source of resources and their raw attributes.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List every resource of `kind`.
    async fn enumerate(&self, kind: &ResourceKind) -> Result<Vec<ResourceRef>, InventoryError>;

    /// Fetch one attribute group for one resource.
    async fn fetch_attribute(
        &self,
        kind: &ResourceKind,
        resource: &ResourceRef,
        group: &str,
    ) -> AttributeFetch;
}
