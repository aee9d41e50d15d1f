//! Layered service configuration.
//!
//! Values resolve in order: command-line flags, `POSTURELEDGER_*` environment
//! variables, a `.env.postureledger` file in the working directory, then
//! built-in defaults. [`ServiceConfig`] also builds the store, rule table,
//! link signer and services from the resolved values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use crate::collector::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS};
use crate::collector::{Collector, CollectorIdentity, RetryPolicy};
use crate::controls::{MappingEngine, RuleTable};
use crate::error::{ComplianceError, ComplianceResult};
use crate::export::{ExportService, LinkSigner, DEFAULT_LINK_TTL_SECS};
use crate::inventory::{InventorySource, ResourceKind};
use crate::store::fs::{FsBlobStore, FsIndex};
use crate::store::EvidenceStore;

/// Name of the optional `KEY=VALUE` file read from the working directory.
pub const ENV_FILE_NAME: &str = ".env.postureledger";

const DEFAULT_DATA_DIR: &str = "ledger";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REGION: &str = "us-east-1";

/// Resolved service configuration.
///
/// Resolution precedence: CLI flags > env vars > `.env.postureledger` file > defaults.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Required for collection; not needed to serve or export.
    pub account: Option<String>,
    pub region: String,
    pub resource_kind: ResourceKind,
    pub blob_root: PathBuf,
    pub index_root: PathBuf,
    /// `None` selects the builtin rule table.
    pub rules_path: Option<PathBuf>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub page_size: usize,
    pub link_ttl: Duration,
    pub public_base_url: String,
    /// Hex Ed25519 seed. `None` means an ephemeral key per process.
    pub signing_key_hex: Option<String>,
}

/// CLI flags that override env/file values. `None` means "not provided".
#[derive(Debug, Default, Clone)]
pub struct ServiceFlags {
    pub account: Option<String>,
    pub region: Option<String>,
    pub resource_type: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub rules_path: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub page_size: Option<usize>,
    pub link_ttl_secs: Option<u64>,
    pub public_base_url: Option<String>,
    pub signing_key_hex: Option<String>,
}

impl ServiceConfig {
    /// Resolve from flags, the process environment and `dir/.env.postureledger`.
    pub fn resolve(flags: &ServiceFlags, dir: &Path) -> ComplianceResult<Self> {
        Self::resolve_with(flags, dir, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        flags: &ServiceFlags,
        dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> ComplianceResult<Self> {
        let file_vars = parse_env_file(&dir.join(ENV_FILE_NAME));

        let get = |flag: Option<String>, env_names: &[&str]| -> Option<String> {
            if flag.is_some() {
                return flag;
            }
            for name in env_names {
                if let Some(v) = env(name) {
                    if !v.is_empty() {
                        return Some(v);
                    }
                }
            }
            file_vars.get(env_names[0]).cloned()
        };

        let account = get(flags.account.clone(), &["POSTURELEDGER_ACCOUNT"]);
        let region = get(
            flags.region.clone(),
            &["POSTURELEDGER_REGION", "AWS_REGION"],
        )
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let type_name = get(flags.resource_type.clone(), &["POSTURELEDGER_RESOURCE_TYPE"]);
        let resource_kind = match type_name {
            Some(name) => ResourceKind::by_name(&name).ok_or_else(|| {
                ComplianceError::config(format!("unknown resource type '{}'", name))
            })?,
            None => ResourceKind::s3_bucket(),
        };

        let data_dir = get(
            flags.data_dir.as_ref().map(|p| p.display().to_string()),
            &["POSTURELEDGER_DATA_DIR"],
        )
        .map(PathBuf::from)
        .unwrap_or_else(|| dir.join(DEFAULT_DATA_DIR));
        let blob_root = get(None, &["POSTURELEDGER_BLOB_ROOT"])
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("blobs"));
        let index_root = get(None, &["POSTURELEDGER_INDEX_ROOT"])
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("index"));

        let rules_path = get(
            flags.rules_path.as_ref().map(|p| p.display().to_string()),
            &["POSTURELEDGER_RULES"],
        )
        .map(PathBuf::from);

        let concurrency = parse_number(
            get(flags.concurrency.map(|v| v.to_string()), &["POSTURELEDGER_CONCURRENCY"]),
            "POSTURELEDGER_CONCURRENCY",
            DEFAULT_CONCURRENCY,
        )?;
        let page_size = parse_number(
            get(flags.page_size.map(|v| v.to_string()), &["POSTURELEDGER_PAGE_SIZE"]),
            "POSTURELEDGER_PAGE_SIZE",
            DEFAULT_PAGE_SIZE,
        )?;
        if concurrency == 0 || page_size == 0 {
            return Err(ComplianceError::config(
                "concurrency and page size must be at least 1",
            ));
        }

        let retry = RetryPolicy {
            max_attempts: parse_number(
                get(None, &["POSTURELEDGER_RETRY_ATTEMPTS"]),
                "POSTURELEDGER_RETRY_ATTEMPTS",
                DEFAULT_MAX_ATTEMPTS,
            )?,
            base_delay: Duration::from_millis(parse_number(
                get(None, &["POSTURELEDGER_RETRY_BASE_MS"]),
                "POSTURELEDGER_RETRY_BASE_MS",
                DEFAULT_BASE_DELAY_MS,
            )?),
            max_delay: Duration::from_millis(parse_number(
                get(None, &["POSTURELEDGER_RETRY_MAX_MS"]),
                "POSTURELEDGER_RETRY_MAX_MS",
                DEFAULT_MAX_DELAY_MS,
            )?),
        };

        let link_ttl = Duration::from_secs(parse_number(
            get(flags.link_ttl_secs.map(|v| v.to_string()), &["POSTURELEDGER_LINK_TTL_SECS"]),
            "POSTURELEDGER_LINK_TTL_SECS",
            DEFAULT_LINK_TTL_SECS,
        )?);

        let public_base_url = get(
            flags.public_base_url.clone(),
            &["POSTURELEDGER_PUBLIC_BASE_URL"],
        )
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());

        let signing_key_hex = get(flags.signing_key_hex.clone(), &["POSTURELEDGER_SIGNING_KEY"]);

        Ok(Self {
            account,
            region,
            resource_kind,
            blob_root,
            index_root,
            rules_path,
            concurrency,
            retry,
            page_size,
            link_ttl,
            public_base_url,
            signing_key_hex,
        })
    }

    /// Account and region for a collection pass. Errors if no account is set.
    pub fn identity(&self) -> ComplianceResult<CollectorIdentity> {
        let account = self.account.clone().ok_or_else(|| {
            ComplianceError::config(
                "account is required: pass --account or set POSTURELEDGER_ACCOUNT",
            )
        })?;
        Ok(CollectorIdentity {
            account,
            region: self.region.clone(),
        })
    }

    pub fn open_store(&self) -> EvidenceStore {
        EvidenceStore::new(
            Arc::new(FsBlobStore::new(&self.blob_root)),
            Arc::new(FsIndex::new(&self.index_root, self.page_size)),
        )
    }

    pub fn rule_table(&self) -> ComplianceResult<RuleTable> {
        match &self.rules_path {
            Some(path) => RuleTable::from_path(path),
            None => RuleTable::builtin(),
        }
    }

    pub fn link_signer(&self) -> ComplianceResult<LinkSigner> {
        match &self.signing_key_hex {
            Some(seed) => LinkSigner::from_hex_seed(seed),
            None => {
                tracing::warn!(
                    "POSTURELEDGER_SIGNING_KEY not set; export links are signed with an ephemeral key"
                );
                Ok(LinkSigner::new(SigningKey::generate(&mut OsRng)))
            }
        }
    }

    pub fn export_service(&self) -> ComplianceResult<ExportService> {
        Ok(ExportService::new(
            self.open_store(),
            self.link_signer()?,
            self.link_ttl,
            self.public_base_url.clone(),
        ))
    }

    pub fn collector(&self, inventory: Arc<dyn InventorySource>) -> ComplianceResult<Collector> {
        Ok(Collector::new(
            inventory,
            self.resource_kind.clone(),
            MappingEngine::new(self.rule_table()?),
            self.open_store(),
            self.identity()?,
        )
        .with_retry(self.retry)
        .with_concurrency(self.concurrency))
    }
}

fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    name: &str,
    default: T,
) -> ComplianceResult<T> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ComplianceError::config(format!("{} must be a number, got '{}'", name, v))),
        None => Ok(default),
    }
}

/// Read a `.env.postureledger` file into a key-value map.
///
/// Lines are `KEY=VALUE`, optionally prefixed with `export`, with blank lines
/// and `#` comments ignored. A matching pair of quotes around the value is
/// removed. Malformed lines are logged and skipped. A missing file yields an
/// empty map.
pub fn parse_env_file(path: &Path) -> HashMap<String, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "cannot read env file");
            }
            return HashMap::new();
        }
    };

    content
        .lines()
        .enumerate()
        .filter_map(|(n, line)| match env_assignment(line) {
            Ok(pair) => pair,
            Err(reason) => {
                tracing::warn!(path = %path.display(), line = n + 1, reason, "skipping env file line");
                None
            }
        })
        .collect()
}

/// `Ok(None)` for blank and comment lines.
fn env_assignment(line: &str) -> Result<Option<(String, String)>, &'static str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line
        .strip_prefix("export")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map_or(line, str::trim_start);
    let (key, value) = line.split_once('=').ok_or("missing '='")?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("invalid variable name");
    }
    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|&q| value.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(value);
    Ok(Some((key.to_string(), unquoted.to_string())))
}
