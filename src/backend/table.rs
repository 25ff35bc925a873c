// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key/value table backend.
//!
//! # Item Layout
//!
//! | Table shape | Partition key | Sort key |
//! |-------------|---------------|----------|
//! | No sort key | full key path | - |
//! | With sort key | `Application[/Environment][/User]` | `Action/correlation.json` |
//!
//! Each item carries `correlationId` and `created` as string attributes, plus
//! a numeric expiry attribute (unix seconds) when the table config sets a
//! time to live. Only tables with a sort key can be queried.

use super::{action_from_suffix, AdapterError, BackendKind, BoxFuture, StorageBackend, MAX_QUERY_RESULTS};
use crate::config::TableConfig;
use crate::key::RecordPath;
use crate::record::{CorrelationRecord, CREATED_ATTRIBUTE, VALUE_ATTRIBUTE};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    S(String),
    N(i64),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::N(_) => None,
        }
    }

    pub fn as_n(&self) -> Option<i64> {
        match self {
            AttributeValue::N(n) => Some(*n),
            AttributeValue::S(_) => None,
        }
    }
}

/// Primary key of an item: partition attribute and optional sort attribute,
/// each as `(name, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub partition: (String, String),
    pub sort: Option<(String, String)>,
}

impl TableKey {
    pub fn partition_value(&self) -> &str {
        &self.partition.1
    }

    pub fn sort_value(&self) -> Option<&str> {
        self.sort.as_ref().map(|(_, v)| v.as_str())
    }
}

/// An item to write.
#[derive(Debug, Clone, PartialEq)]
pub struct TableItem {
    pub key: TableKey,
    /// Non-key attributes, including the expiry attribute when set.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Unix seconds after which the item no longer exists.
    pub expires_at: Option<i64>,
}

/// Minimal table client.
pub trait TableClient: Send + Sync + 'static {
    /// Create or replace the item with `item.key`.
    fn put_item<'a>(&'a self, table: &'a str, item: TableItem) -> BoxFuture<'a, ()>;

    /// Non-key attributes of the item at `key`, or `Ok(None)`.
    fn get_item<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableKey,
    ) -> BoxFuture<'a, Option<BTreeMap<String, AttributeValue>>>;

    /// Sort key values of live items in one partition, ascending, at most `limit`.
    fn query_sort_keys<'a>(
        &'a self,
        table: &'a str,
        partition: (&'a str, &'a str),
        sort_key_name: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Vec<String>>;
}

/// Adapter over any [`TableClient`].
#[derive(Clone)]
pub struct TableBackend {
    client: Arc<dyn TableClient>,
}

impl TableBackend {
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        Self { client }
    }

    /// Split a record path into the table's primary key.
    pub fn table_key(config: &TableConfig, path: &RecordPath) -> TableKey {
        let partition_name = config.partition_key_name().to_string();
        if config.has_sort_key() {
            TableKey {
                partition: (partition_name, path.address.trim_end_matches('/').to_string()),
                sort: Some((config.sort_key_name().to_string(), path.action_suffix.clone())),
            }
        } else {
            TableKey {
                partition: (partition_name, path.full.clone()),
                sort: None,
            }
        }
    }

    fn item(config: &TableConfig, path: &RecordPath, record: &CorrelationRecord) -> TableItem {
        let mut attributes = BTreeMap::new();
        attributes.insert(VALUE_ATTRIBUTE.to_string(), AttributeValue::S(record.value().to_string()));
        attributes.insert(CREATED_ATTRIBUTE.to_string(), AttributeValue::S(record.created_iso()));

        let expires_at = config.time_to_live().map(|(name, hours)| {
            let at = (Utc::now() + ChronoDuration::hours(hours)).timestamp();
            attributes.insert(name.to_string(), AttributeValue::N(at));
            at
        });

        TableItem {
            key: Self::table_key(config, path),
            attributes,
            expires_at,
        }
    }

    fn record_from(attributes: &BTreeMap<String, AttributeValue>) -> Result<CorrelationRecord, AdapterError> {
        let string_attr = |name: &str| {
            attributes
                .get(name)
                .and_then(AttributeValue::as_s)
                .ok_or_else(|| AdapterError::Corrupt(format!("item is missing string attribute {:?}", name)))
        };
        let value = string_attr(VALUE_ATTRIBUTE)?;
        let created = string_attr(CREATED_ATTRIBUTE)?;
        let created = CorrelationRecord::parse_created(created)
            .map_err(|e| AdapterError::Corrupt(format!("invalid {} timestamp {:?}: {}", CREATED_ATTRIBUTE, created, e)))?;
        Ok(CorrelationRecord::with_created(value, created))
    }
}

impl std::fmt::Debug for TableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableBackend").finish_non_exhaustive()
    }
}

impl StorageBackend for TableBackend {
    type Config = TableConfig;

    fn kind(&self) -> BackendKind {
        BackendKind::Table
    }

    fn store<'a>(
        &'a self,
        config: &'a TableConfig,
        path: &'a RecordPath,
        record: &'a CorrelationRecord,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let item = Self::item(config, path, record);
            trace!(
                table = %config.table_name(),
                partition = %item.key.partition_value(),
                sort = ?item.key.sort_value(),
                expires_at = ?item.expires_at,
                "Putting correlation item"
            );
            self.client.put_item(config.table_name(), item).await
        })
    }

    fn load<'a>(
        &'a self,
        config: &'a TableConfig,
        path: &'a RecordPath,
    ) -> BoxFuture<'a, Option<CorrelationRecord>> {
        Box::pin(async move {
            let key = Self::table_key(config, path);
            match self.client.get_item(config.table_name(), &key).await? {
                Some(attributes) => Self::record_from(&attributes).map(Some),
                None => Ok(None),
            }
        })
    }

    fn query<'a>(&'a self, config: &'a TableConfig, address: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            if !config.has_sort_key() {
                return Err(AdapterError::Client(format!(
                    "table {} has no sort key and cannot be queried",
                    config.table_name()
                )));
            }

            let sort_values = self
                .client
                .query_sort_keys(
                    config.table_name(),
                    (config.partition_key_name(), address.trim_end_matches('/')),
                    config.sort_key_name(),
                    MAX_QUERY_RESULTS,
                )
                .await?;

            let actions: Vec<String> = sort_values
                .iter()
                .filter_map(|s| action_from_suffix(s))
                .map(str::to_string)
                .collect();

            debug!(
                table = %config.table_name(),
                partition = %address,
                items = sort_values.len(),
                actions = actions.len(),
                "Queried correlation items"
            );
            Ok(actions)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory client
// ═══════════════════════════════════════════════════════════════════════════════

type ItemKey = (String, String);

/// `BTreeMap`-backed [`TableClient`] for tests and single-process use.
///
/// Expired items are invisible to reads but stay in memory until
/// overwritten.
#[derive(Debug, Default)]
pub struct InMemoryTableClient {
    tables: RwLock<BTreeMap<String, BTreeMap<ItemKey, TableItem>>>,
}

impl InMemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn item_key(key: &TableKey) -> ItemKey {
        (
            key.partition_value().to_string(),
            key.sort_value().unwrap_or_default().to_string(),
        )
    }

    fn is_live(item: &TableItem, now: i64) -> bool {
        item.expires_at.map_or(true, |at| at > now)
    }

    /// Raw stored item, expired or not.
    pub async fn raw_item(&self, table: &str, key: &TableKey) -> Option<TableItem> {
        self.tables
            .read()
            .await
            .get(table)
            .and_then(|items| items.get(&Self::item_key(key)))
            .cloned()
    }

    /// Number of items in `table`, expired ones included.
    pub async fn item_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }
}

impl TableClient for InMemoryTableClient {
    fn put_item<'a>(&'a self, table: &'a str, item: TableItem) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            tables
                .entry(table.to_string())
                .or_default()
                .insert(Self::item_key(&item.key), item);
            Ok(())
        })
    }

    fn get_item<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableKey,
    ) -> BoxFuture<'a, Option<BTreeMap<String, AttributeValue>>> {
        Box::pin(async move {
            let now = Utc::now().timestamp();
            let tables = self.tables.read().await;
            Ok(tables
                .get(table)
                .and_then(|items| items.get(&Self::item_key(key)))
                .filter(|item| item.key == *key && Self::is_live(item, now))
                .map(|item| item.attributes.clone()))
        })
    }

    fn query_sort_keys<'a>(
        &'a self,
        table: &'a str,
        partition: (&'a str, &'a str),
        sort_key_name: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let now = Utc::now().timestamp();
            let tables = self.tables.read().await;
            let Some(items) = tables.get(table) else {
                return Ok(Vec::new());
            };
            let (partition_name, partition_value) = partition;
            Ok(items
                .values()
                .filter(|item| item.key.partition.0 == partition_name && item.key.partition.1 == partition_value)
                .filter(|item| Self::is_live(item, now))
                .filter_map(|item| item.key.sort.as_ref())
                .filter(|(name, _)| name == sort_key_name)
                .map(|(_, value)| value.clone())
                .take(limit)
                .collect())
        })
    }
}
