//! Spy StorageBackend for testing.
//!
//! Records every call for assertions. Can be told to fail (always, or after
//! N successful calls), seeded with records carrying chosen timestamps, and
//! given canned query listings.

use correlation_engine::backend::{AdapterError, BackendKind, BoxFuture, StorageBackend};
use correlation_engine::config::{DiskConfig, ObjectStoreConfig, Operation, ReplicationConfig, TableConfig};
use correlation_engine::key::{RecordPath, StorageKey};
use correlation_engine::{CorrelationRecord, ReplicationEngine};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpyCall {
    pub operation: Operation,
    /// Full path for store/load, address for query.
    pub target: String,
}

/// Spy implementation of StorageBackend for any config type.
///
/// # Example
/// ```rust,ignore
/// let disk = Arc::new(DiskSpy::new(BackendKind::Disk));
/// disk.set_failing(true);
///
/// // Use in an engine via ReplicationEngine::with_backends...
///
/// assert_eq!(disk.call_count(), 1);
/// ```
pub struct SpyBackend<C> {
    kind: BackendKind,
    calls: RwLock<Vec<SpyCall>>,
    call_count: AtomicUsize,
    /// Fail every call
    failing: AtomicBool,
    /// Fail once this many calls have succeeded
    fail_after: AtomicUsize,
    /// Stored records by full path
    records: RwLock<HashMap<String, (RecordPath, CorrelationRecord)>>,
    /// Canned query answers by address
    listings: RwLock<HashMap<String, Vec<String>>>,
    _config: PhantomData<fn() -> C>,
}

pub type DiskSpy = SpyBackend<DiskConfig>;
pub type ObjectStoreSpy = SpyBackend<ObjectStoreConfig>;
pub type TableSpy = SpyBackend<TableConfig>;

impl<C> SpyBackend<C> {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            calls: RwLock::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            fail_after: AtomicUsize::new(usize::MAX),
            records: RwLock::new(HashMap::new()),
            listings: RwLock::new(HashMap::new()),
            _config: PhantomData,
        }
    }

    /// Create a spy that fails every call.
    pub fn failing(kind: BackendKind) -> Self {
        let spy = Self::new(kind);
        spy.set_failing(true);
        spy
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Configure calls to fail after N successful calls.
    pub fn fail_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Total adapter calls received.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<SpyCall> {
        self.calls.read().await.clone()
    }

    /// Count calls of one operation.
    pub async fn count(&self, operation: Operation) -> usize {
        self.calls.read().await.iter().filter(|c| c.operation == operation).count()
    }

    /// Put a record in place without going through the engine.
    pub async fn seed(&self, key: &StorageKey, record: CorrelationRecord) {
        let path = key.record_path().expect("seeded key must have an explicit action");
        self.records.write().await.insert(path.full.clone(), (path, record));
    }

    /// Fix the answer to a query on `address`.
    pub async fn set_listing(&self, address: &str, actions: &[&str]) {
        self.listings
            .write()
            .await
            .insert(address.to_string(), actions.iter().map(|a| a.to_string()).collect());
    }

    /// The record stored at a full path, if any.
    pub async fn stored(&self, full_path: &str) -> Option<CorrelationRecord> {
        self.records.read().await.get(full_path).map(|(_, r)| r.clone())
    }

    async fn enter(&self, operation: Operation, target: &str) -> Result<(), AdapterError> {
        self.calls.write().await.push(SpyCall {
            operation,
            target: target.to_string(),
        });
        let previous = self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) || previous >= self.fail_after.load(Ordering::SeqCst) {
            return Err(AdapterError::Client(format!("injected {} failure on {}", operation, self.kind)));
        }
        Ok(())
    }
}

impl<C: Send + Sync + 'static> StorageBackend for SpyBackend<C> {
    type Config = C;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn store<'a>(&'a self, _config: &'a C, path: &'a RecordPath, record: &'a CorrelationRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.enter(Operation::Store, &path.full).await?;
            self.records
                .write()
                .await
                .insert(path.full.clone(), (path.clone(), record.clone()));
            Ok(())
        })
    }

    fn load<'a>(&'a self, _config: &'a C, path: &'a RecordPath) -> BoxFuture<'a, Option<CorrelationRecord>> {
        Box::pin(async move {
            self.enter(Operation::Load, &path.full).await?;
            Ok(self.records.read().await.get(&path.full).map(|(_, r)| r.clone()))
        })
    }

    fn query<'a>(&'a self, _config: &'a C, address: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.enter(Operation::Query, address).await?;
            if let Some(actions) = self.listings.read().await.get(address) {
                return Ok(actions.clone());
            }
            Ok(self
                .records
                .read()
                .await
                .values()
                .filter(|(path, _)| path.address == address)
                .filter_map(|(path, _)| path.action_suffix.split('/').next().map(str::to_string))
                .collect())
        })
    }
}

/// Three spies and an engine wired to them.
pub struct SpyRig {
    pub disk: Arc<DiskSpy>,
    pub object_store: Arc<ObjectStoreSpy>,
    pub table: Arc<TableSpy>,
    pub engine: ReplicationEngine,
}

impl SpyRig {
    pub fn new() -> Self {
        Self::from_spies(
            DiskSpy::new(BackendKind::Disk),
            ObjectStoreSpy::new(BackendKind::ObjectStore),
            TableSpy::new(BackendKind::Table),
        )
    }

    pub fn from_spies(disk: DiskSpy, object_store: ObjectStoreSpy, table: TableSpy) -> Self {
        let disk = Arc::new(disk);
        let object_store = Arc::new(object_store);
        let table = Arc::new(table);
        let engine = ReplicationEngine::with_backends(disk.clone(), object_store.clone(), table.clone());
        Self {
            disk,
            object_store,
            table,
            engine,
        }
    }

    /// Calls across all three spies.
    pub fn total_calls(&self) -> usize {
        self.disk.call_count() + self.object_store.call_count() + self.table.call_count()
    }
}

impl Default for SpyRig {
    fn default() -> Self {
        Self::new()
    }
}

/// Config naming all three backends. The spies ignore the settings.
pub fn all_backends_config() -> ReplicationConfig {
    ReplicationConfig::default()
        .with_disk(DiskConfig::new("/unused").unwrap())
        .with_object_store(ObjectStoreConfig::new("bucket").unwrap())
        .with_table(TableConfig::new("correlations", "pk").unwrap().with_sort_key("sk"))
}
