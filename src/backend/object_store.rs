// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Object store backend.
//!
//! Records are JSON blobs at `bucket:prefix/<full key path>`. The adapter
//! only needs three calls from the underlying store, captured by
//! [`ObjectClient`], so any SDK can be plugged in behind an `Arc`.

use super::{action_from_suffix, AdapterError, BackendKind, BoxFuture, StorageBackend, MAX_QUERY_RESULTS};
use crate::config::ObjectStoreConfig;
use crate::key::RecordPath;
use crate::record::CorrelationRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Content type attached to every stored record.
pub const RECORD_CONTENT_TYPE: &str = "application/json";

/// Minimal blob store client.
pub trait ObjectClient: Send + Sync + 'static {
    /// Create or replace the object at `key`.
    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, ()>;

    /// Fetch an object body. `Ok(None)` when the key does not exist.
    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>>;

    /// Keys starting with `prefix`, in lexicographic order, at most `max_keys`.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        max_keys: usize,
    ) -> BoxFuture<'a, Vec<String>>;
}

/// Object key for a path under the configured prefix, without a leading `/`.
fn object_key(prefix: &str, path: &str) -> String {
    let joined = if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), path)
    };
    joined.trim_start_matches('/').to_string()
}

/// Adapter over any [`ObjectClient`].
#[derive(Clone)]
pub struct ObjectStoreBackend {
    client: Arc<dyn ObjectClient>,
}

impl ObjectStoreBackend {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend").finish_non_exhaustive()
    }
}

impl StorageBackend for ObjectStoreBackend {
    type Config = ObjectStoreConfig;

    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    fn store<'a>(
        &'a self,
        config: &'a ObjectStoreConfig,
        path: &'a RecordPath,
        record: &'a CorrelationRecord,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let key = object_key(config.prefix(), &path.full);
            let body = record.to_json()?;
            self.client
                .put_object(config.bucket(), &key, body, RECORD_CONTENT_TYPE)
                .await?;
            trace!(bucket = %config.bucket(), key = %key, "Stored correlation record object");
            Ok(())
        })
    }

    fn load<'a>(
        &'a self,
        config: &'a ObjectStoreConfig,
        path: &'a RecordPath,
    ) -> BoxFuture<'a, Option<CorrelationRecord>> {
        Box::pin(async move {
            let key = object_key(config.prefix(), &path.full);
            match self.client.get_object(config.bucket(), &key).await? {
                Some(body) => Ok(Some(CorrelationRecord::from_json(&body)?)),
                None => Ok(None),
            }
        })
    }

    fn query<'a>(&'a self, config: &'a ObjectStoreConfig, address: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let listing_prefix = format!("{}/", object_key(config.prefix(), address));
            let keys = self
                .client
                .list_objects(config.bucket(), &listing_prefix, MAX_QUERY_RESULTS)
                .await?;

            let mut actions: Vec<String> = keys
                .iter()
                .filter_map(|key| key.strip_prefix(listing_prefix.as_str()))
                .filter_map(action_from_suffix)
                .map(str::to_string)
                .collect();
            actions.dedup();

            debug!(
                bucket = %config.bucket(),
                prefix = %listing_prefix,
                listed = keys.len(),
                actions = actions.len(),
                "Listed correlation record objects"
            );
            Ok(actions)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory client
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
}

/// `BTreeMap`-backed [`ObjectClient`] for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryObjectClient {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl InMemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Content type an object was stored with.
    pub async fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.content_type.clone())
    }

    /// Store raw bytes, bypassing record encoding.
    pub async fn insert_raw(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: RECORD_CONTENT_TYPE.to_string(),
            },
        );
    }
}

impl ObjectClient for InMemoryObjectClient {
    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if bucket.is_empty() {
                return Err(AdapterError::Client("bucket name must not be empty".to_string()));
            }
            self.objects.write().await.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                },
            );
            Ok(())
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            Ok(self
                .objects
                .read()
                .await
                .get(&(bucket.to_string(), key.to_string()))
                .map(|o| o.body.clone()))
        })
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        max_keys: usize,
    ) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let objects = self.objects.read().await;
            Ok(objects
                .keys()
                .filter(|(b, k)| b == bucket && k.starts_with(prefix))
                .map(|(_, k)| k.clone())
                .take(max_keys)
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Action, StorageKey};

    fn path(user: Option<&str>, action: &str) -> RecordPath {
        StorageKey::new("app", Some("uat"), user, Action::explicit(action).unwrap())
            .unwrap()
            .record_path()
            .unwrap()
    }

    fn backend() -> (Arc<InMemoryObjectClient>, ObjectStoreBackend) {
        let client = Arc::new(InMemoryObjectClient::new());
        (client.clone(), ObjectStoreBackend::new(client))
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("", "app/x/correlation.json"), "app/x/correlation.json");
        assert_eq!(object_key("diag", "app/x/correlation.json"), "diag/app/x/correlation.json");
        assert_eq!(object_key("diag/", "app"), "diag/app");
        assert_eq!(object_key("/diag", "app"), "diag/app");
    }

    #[tokio::test]
    async fn test_store_writes_json_under_prefix() {
        let (client, backend) = backend();
        let config = ObjectStoreConfig::new("bucket").unwrap().with_prefix("diag");
        let record = CorrelationRecord::new("cid-obj");

        backend.store(&config, &path(None, "save"), &record).await.unwrap();

        let key = "diag/app/uat/save/correlation.json";
        assert_eq!(client.content_type("bucket", key).await.as_deref(), Some(RECORD_CONTENT_TYPE));
        let loaded = backend.load(&config, &path(None, "save")).await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_load_missing_and_corrupt() {
        let (client, backend) = backend();
        let config = ObjectStoreConfig::new("bucket").unwrap();
        assert!(backend.load(&config, &path(None, "none")).await.unwrap().is_none());

        client.insert_raw("bucket", "app/uat/bad/correlation.json", "{}").await;
        assert!(matches!(
            backend.load(&config, &path(None, "bad")).await,
            Err(AdapterError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_query_returns_direct_actions_only() {
        let (_client, backend) = backend();
        let config = ObjectStoreConfig::new("bucket").unwrap();
        let record = CorrelationRecord::new("cid");
        backend.store(&config, &path(None, "b"), &record).await.unwrap();
        backend.store(&config, &path(None, "a"), &record).await.unwrap();
        // belongs to a user under the same address
        backend.store(&config, &path(Some("42"), "c"), &record).await.unwrap();

        let actions = backend.query(&config, "app/uat").await.unwrap();
        assert_eq!(actions, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_query_ignores_other_buckets_and_lookalike_prefixes() {
        let (client, backend) = backend();
        let config = ObjectStoreConfig::new("bucket").unwrap();
        client.insert_raw("other", "app/uat/x/correlation.json", "{}").await;
        client.insert_raw("bucket", "app/uat2/y/correlation.json", "{}").await;
        assert!(backend.query(&config, "app/uat").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_objects_honours_max_keys() {
        let client = InMemoryObjectClient::new();
        for i in 0..5 {
            client
                .put_object("bucket", &format!("p/{}", i), vec![], RECORD_CONTENT_TYPE)
                .await
                .unwrap();
        }
        let keys = client.list_objects("bucket", "p/", 3).await.unwrap();
        assert_eq!(keys, vec!["p/0", "p/1", "p/2"]);
        assert_eq!(client.len().await, 5);
    }
}
