// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the correlation engine.
//!
//! Backend configs are validated when they are built (or deserialized), so an
//! invalid config never reaches a backend. A [`ReplicationConfig`] may hold
//! zero to three of them; the engine rejects an empty one on every operation.
//!
//! # Configuration Structure
//!
//! ```text
//! EngineOptions
//! ├── sources: ReplicationConfig
//! │   ├── disk: DiskConfig               # rootPath
//! │   ├── objectStore: ObjectStoreConfig # bucket, prefix
//! │   └── table: TableConfig             # tableName, partitionKeyName, sortKeyName, TTL
//! └── key: StorageKeyOptions             # application, environment, user, namespace, offset
//! ```
//!
//! Every backend config carries an `operationDissect` list naming the
//! operations that backend sits out.
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "sources": {
//!     "disk": { "rootPath": "/var/tmp/correlation" },
//!     "table": {
//!       "tableName": "correlations",
//!       "partitionKeyName": "pk",
//!       "sortKeyName": "sk",
//!       "timeToLiveName": "ttl",
//!       "timeToLiveHours": 72,
//!       "operationDissect": ["load"]
//!     }
//!   },
//!   "key": { "application": "billing", "environment": "uat", "namespace": "billing.api" }
//! }
//! ```

use crate::backend::BackendKind;
use crate::error::{ReplicationError, Result};
use crate::key::{Action, StorageKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Upper bound (inclusive) for a table item's time to live.
pub const MAX_TIME_TO_LIVE_HOURS: i64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// Operations and dissection
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine operation, used to label dissections, errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Store,
    Load,
    Query,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Store => "store",
            Operation::Load => "load",
            Operation::Query => "query",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Operation::Store => 0b001,
            Operation::Load => 0b010,
            Operation::Query => 0b100,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a backend must be skipped for.
///
/// ```rust
/// use correlation_engine::config::{Operation, OperationDissect};
///
/// let dissect = OperationDissect::STORE | OperationDissect::QUERY;
/// assert!(dissect.contains(Operation::Query));
/// assert!(!dissect.contains(Operation::Load));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Operation>", into = "Vec<Operation>")]
pub struct OperationDissect(u8);

impl OperationDissect {
    pub const NONE: Self = Self(0);
    pub const STORE: Self = Self(0b001);
    pub const LOAD: Self = Self(0b010);
    pub const QUERY: Self = Self(0b100);

    pub fn contains(&self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn operations(&self) -> Vec<Operation> {
        [Operation::Store, Operation::Load, Operation::Query]
            .into_iter()
            .filter(|op| self.contains(*op))
            .collect()
    }
}

impl From<Operation> for OperationDissect {
    fn from(op: Operation) -> Self {
        Self(op.bit())
    }
}

impl From<Vec<Operation>> for OperationDissect {
    fn from(ops: Vec<Operation>) -> Self {
        ops.into_iter().fold(Self::NONE, |acc, op| acc | op.into())
    }
}

impl From<OperationDissect> for Vec<Operation> {
    fn from(dissect: OperationDissect) -> Self {
        dissect.operations()
    }
}

impl BitOr for OperationDissect {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OperationDissect {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

// ═══════════════════════════════════════════════════════════════════════════════
// DiskConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Local disk: records live under `root_path/<key path>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDiskConfig", rename_all = "camelCase")]
pub struct DiskConfig {
    root_path: String,
    operation_dissect: OperationDissect,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiskConfig {
    #[serde(default)]
    root_path: String,
    #[serde(default)]
    operation_dissect: OperationDissect,
}

impl TryFrom<RawDiskConfig> for DiskConfig {
    type Error = ReplicationError;

    fn try_from(raw: RawDiskConfig) -> Result<Self> {
        Self::new(raw.root_path).map(|c| c.with_dissect(raw.operation_dissect))
    }
}

impl DiskConfig {
    pub fn new(root_path: impl Into<String>) -> Result<Self> {
        let root_path = root_path.into();
        if is_blank(&root_path) {
            return Err(ReplicationError::config("disk config requires a non-empty root path"));
        }
        Ok(Self {
            root_path,
            operation_dissect: OperationDissect::NONE,
        })
    }

    pub fn with_dissect(mut self, dissect: OperationDissect) -> Self {
        self.operation_dissect = dissect;
        self
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn dissect(&self) -> OperationDissect {
        self.operation_dissect
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ObjectStoreConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Object store: records live at `bucket:prefix/<key path>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawObjectStoreConfig", rename_all = "camelCase")]
pub struct ObjectStoreConfig {
    bucket: String,
    prefix: String,
    operation_dissect: OperationDissect,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObjectStoreConfig {
    #[serde(default)]
    bucket: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    operation_dissect: OperationDissect,
}

impl TryFrom<RawObjectStoreConfig> for ObjectStoreConfig {
    type Error = ReplicationError;

    fn try_from(raw: RawObjectStoreConfig) -> Result<Self> {
        Ok(Self::new(raw.bucket)?
            .with_prefix(raw.prefix.unwrap_or_default())
            .with_dissect(raw.operation_dissect))
    }
}

impl ObjectStoreConfig {
    pub fn new(bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if is_blank(&bucket) {
            return Err(ReplicationError::config("object store config requires a non-empty bucket"));
        }
        Ok(Self {
            bucket,
            prefix: String::new(),
            operation_dissect: OperationDissect::NONE,
        })
    }

    /// A blank prefix is stored as empty.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = if is_blank(&prefix) { String::new() } else { prefix };
        self
    }

    pub fn with_dissect(mut self, dissect: OperationDissect) -> Self {
        self.operation_dissect = dissect;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn dissect(&self) -> OperationDissect {
        self.operation_dissect
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TableConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Key/value table.
///
/// Without a sort key the whole key path is the partition key. With one, the
/// partition holds the address and the sort key holds `action/correlation.json`,
/// which is what lets [`query`](crate::ReplicationEngine::query) list actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTableConfig", rename_all = "camelCase")]
pub struct TableConfig {
    table_name: String,
    partition_key_name: String,
    sort_key_name: String,
    time_to_live_name: String,
    time_to_live_hours: Option<i64>,
    operation_dissect: OperationDissect,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTableConfig {
    #[serde(default)]
    table_name: String,
    #[serde(default)]
    partition_key_name: String,
    #[serde(default)]
    sort_key_name: Option<String>,
    #[serde(default)]
    time_to_live_name: Option<String>,
    #[serde(default)]
    time_to_live_hours: Option<i64>,
    #[serde(default)]
    operation_dissect: OperationDissect,
}

impl TryFrom<RawTableConfig> for TableConfig {
    type Error = ReplicationError;

    fn try_from(raw: RawTableConfig) -> Result<Self> {
        let config = Self {
            table_name: raw.table_name,
            partition_key_name: raw.partition_key_name,
            sort_key_name: raw.sort_key_name.filter(|s| !is_blank(s)).unwrap_or_default(),
            time_to_live_name: raw.time_to_live_name.filter(|s| !is_blank(s)).unwrap_or_default(),
            time_to_live_hours: raw.time_to_live_hours,
            operation_dissect: raw.operation_dissect,
        };
        config.validate()?;
        Ok(config)
    }
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>, partition_key_name: impl Into<String>) -> Result<Self> {
        let config = Self {
            table_name: table_name.into(),
            partition_key_name: partition_key_name.into(),
            sort_key_name: String::new(),
            time_to_live_name: String::new(),
            time_to_live_hours: None,
            operation_dissect: OperationDissect::NONE,
        };
        config.validate()?;
        Ok(config)
    }

    /// A blank name means "no sort key".
    pub fn with_sort_key(mut self, sort_key_name: impl Into<String>) -> Self {
        let name = sort_key_name.into();
        self.sort_key_name = if is_blank(&name) { String::new() } else { name };
        self
    }

    /// Expire items `hours` after they are written, via the `name` attribute.
    pub fn with_time_to_live(mut self, name: impl Into<String>, hours: i64) -> Result<Self> {
        let name = name.into();
        self.time_to_live_name = if is_blank(&name) { String::new() } else { name };
        self.time_to_live_hours = Some(hours);
        self.validate()?;
        Ok(self)
    }

    pub fn with_dissect(mut self, dissect: OperationDissect) -> Self {
        self.operation_dissect = dissect;
        self
    }

    fn validate(&self) -> Result<()> {
        if is_blank(&self.table_name) {
            return Err(ReplicationError::config("table config requires a non-empty table name"));
        }
        if is_blank(&self.partition_key_name) {
            return Err(ReplicationError::config(
                "table config requires a non-empty partition key name",
            ));
        }
        if !self.time_to_live_name.is_empty() && self.time_to_live_hours.is_none() {
            return Err(ReplicationError::config(format!(
                "table config sets time to live attribute {:?} without time to live hours",
                self.time_to_live_name
            )));
        }
        if let Some(hours) = self.time_to_live_hours {
            if hours <= 0 || hours > MAX_TIME_TO_LIVE_HOURS {
                return Err(ReplicationError::config(format!(
                    "table time to live hours must be in (0, {}], got {}",
                    MAX_TIME_TO_LIVE_HOURS, hours
                )));
            }
        }
        Ok(())
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn partition_key_name(&self) -> &str {
        &self.partition_key_name
    }

    /// Empty when the table has no sort key.
    pub fn sort_key_name(&self) -> &str {
        &self.sort_key_name
    }

    pub fn has_sort_key(&self) -> bool {
        !self.sort_key_name.is_empty()
    }

    /// `(attribute, hours)` when items should expire.
    pub fn time_to_live(&self) -> Option<(&str, i64)> {
        match (self.time_to_live_name.as_str(), self.time_to_live_hours) {
            ("", _) | (_, None) => None,
            (name, Some(hours)) => Some((name, hours)),
        }
    }

    pub fn dissect(&self) -> OperationDissect {
        self.operation_dissect
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// The set of backends one engine call fans out to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskConfig>,

    #[serde(default, alias = "s3", skip_serializing_if = "Option::is_none")]
    pub object_store: Option<ObjectStoreConfig>,

    #[serde(default, alias = "dynamoDb", skip_serializing_if = "Option::is_none")]
    pub table: Option<TableConfig>,
}

impl ReplicationConfig {
    /// Build a config, failing if no backend is given.
    pub fn new(
        disk: Option<DiskConfig>,
        object_store: Option<ObjectStoreConfig>,
        table: Option<TableConfig>,
    ) -> Result<Self> {
        let config = Self {
            disk,
            object_store,
            table,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_disk(mut self, disk: DiskConfig) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn with_object_store(mut self, object_store: ObjectStoreConfig) -> Self {
        self.object_store = Some(object_store);
        self
    }

    pub fn with_table(mut self, table: TableConfig) -> Self {
        self.table = Some(table);
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReplicationError::config(format!("invalid replication config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.backend_count() == 0
    }

    pub fn backend_count(&self) -> usize {
        [self.disk.is_some(), self.object_store.is_some(), self.table.is_some()]
            .into_iter()
            .filter(|present| *present)
            .count()
    }

    /// An empty config is invalid for every operation.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ReplicationError::config(
                "at least one backend (disk, object store or table) must be configured",
            ));
        }
        Ok(())
    }

    /// True if `kind` is configured and not dissected for `op`.
    pub fn eligible(&self, kind: BackendKind, op: Operation) -> bool {
        let dissect = match kind {
            BackendKind::Disk => self.disk.as_ref().map(DiskConfig::dissect),
            BackendKind::ObjectStore => self.object_store.as_ref().map(ObjectStoreConfig::dissect),
            BackendKind::Table => self.table.as_ref().map(TableConfig::dissect),
        };
        dissect.is_some_and(|d| !d.contains(op))
    }

    /// Eligible backends for `op`, in reconciliation priority order.
    pub fn eligible_backends(&self, op: Operation) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.eligible(*kind, op))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StorageKeyOptions / EngineOptions
// ═══════════════════════════════════════════════════════════════════════════════

/// Key settings read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageKeyOptions {
    pub application: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Namespace used to derive the action from the caller's frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Frames to skip past the nearest qualifying caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl StorageKeyOptions {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            ..Default::default()
        }
    }

    fn environment(&self) -> Option<&str> {
        self.environment.as_deref().filter(|s| !is_blank(s))
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|s| !is_blank(s))
    }

    /// Address-only key, for queries.
    pub fn to_address(&self) -> Result<StorageKey> {
        StorageKey::address(&self.application, self.environment(), self.user())
    }

    /// Key for store/load. `action` overrides the configured namespace.
    pub fn to_key(&self, action: Option<&str>) -> Result<StorageKey> {
        let action = match (action, self.namespace.as_deref()) {
            (Some(action), _) => Action::explicit(action)?,
            (None, Some(namespace)) => Action::derived(namespace, self.offset.unwrap_or(0))?,
            (None, None) => {
                return Err(ReplicationError::validation(
                    "no action given and no namespace configured to derive one",
                ))
            }
        };
        StorageKey::new(&self.application, self.environment(), self.user(), action)
    }
}

/// Defaults used by the engine's config-free calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    #[serde(default)]
    pub sources: ReplicationConfig,
    pub key: StorageKeyOptions,
}

impl EngineOptions {
    pub fn new(sources: ReplicationConfig, key: StorageKeyOptions) -> Self {
        Self { sources, key }
    }

    /// Parse and validate JSON options.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| ReplicationError::config(format!("invalid engine options: {}", e)))?;
        options.sources.validate()?;
        Ok(options)
    }
}
