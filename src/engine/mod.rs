// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine.
//!
//! Fans each operation out to every eligible backend and reduces the answers:
//! - Store: one record, written everywhere; success only if every write landed
//! - Load: newest `created` wins, ties go to disk, then object store, then table
//! - Query: union of the listed actions, de-duplicated by path
//!
//! # Request Flow
//!
//! ```text
//! key + value ──→ preconditions ──→ render paths ──→ tokio::join!(disk, object store, table)
//!                     │                                      │
//!                     ↓ (Config / BadRequest /               ↓
//!                        Validation / Resolution)        reconcile
//!                   error, no I/O
//! ```
//!
//! Absent or dissected backends are skipped without a call. There is no
//! rollback, retry or timeout at this level; a [`PartialWrite`] lists which
//! backends committed.
//!
//! [`PartialWrite`]: crate::ReplicationError::PartialWrite

mod reconcile;
mod types;

pub use types::LoadOutcome;

use crate::backend::{
    BackendKind, BoxFuture, DiskBackend, InMemoryObjectClient, InMemoryTableClient, ObjectClient,
    ObjectStoreBackend, StorageBackend, TableBackend, TableClient,
};
use crate::config::{DiskConfig, EngineOptions, ObjectStoreConfig, Operation, ReplicationConfig, TableConfig};
use crate::error::{ReplicationError, Result};
use crate::key::{CallerContext, RecordPath, StorageKey};
use crate::metrics;
use crate::record::CorrelationRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};
use types::Attempt;

/// Issue one adapter call if the backend is configured and eligible.
async fn dispatch<'a, C, T, F>(
    backend: BackendKind,
    operation: Operation,
    target: &'a str,
    config: Option<&'a C>,
    eligible: bool,
    call: F,
) -> Option<Attempt<T>>
where
    F: FnOnce(&'a C) -> BoxFuture<'a, T>,
{
    let config = config.filter(|_| eligible)?;

    let started = Instant::now();
    let result = call(config).await;
    metrics::record_backend_call(backend, operation, result.is_ok(), started.elapsed());

    if let Err(e) = &result {
        warn!(
            backend = %backend,
            operation = %operation,
            path = %target,
            error = %e,
            "Backend call failed"
        );
    }

    Some(Attempt {
        backend,
        path: target.to_string(),
        result,
    })
}

fn rejection_reason(error: &ReplicationError) -> &'static str {
    match error {
        ReplicationError::Validation(_) => "validation",
        ReplicationError::Resolution(_) => "resolution",
        ReplicationError::Config(_) => "config",
        _ => "bad_request",
    }
}

/// Stores, loads and queries correlation ids across up to three backends.
///
/// The engine is stateless between calls. Backend clients are injected and
/// shared through `Arc`, so one engine can serve any number of tasks.
pub struct ReplicationEngine {
    disk: Arc<dyn StorageBackend<Config = DiskConfig>>,
    object_store: Arc<dyn StorageBackend<Config = ObjectStoreConfig>>,
    table: Arc<dyn StorageBackend<Config = TableConfig>>,

    /// Sources and key used by the `*_default` / `*_action` calls.
    options: Option<EngineOptions>,
}

impl ReplicationEngine {
    /// Engine over the filesystem plus the given object and table clients.
    pub fn new(object_client: Arc<dyn ObjectClient>, table_client: Arc<dyn TableClient>) -> Self {
        Self::with_backends(
            Arc::new(DiskBackend::new()),
            Arc::new(ObjectStoreBackend::new(object_client)),
            Arc::new(TableBackend::new(table_client)),
        )
    }

    /// Engine over the filesystem and in-memory object and table clients.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryObjectClient::new()), Arc::new(InMemoryTableClient::new()))
    }

    /// Engine over arbitrary adapters.
    pub fn with_backends(
        disk: Arc<dyn StorageBackend<Config = DiskConfig>>,
        object_store: Arc<dyn StorageBackend<Config = ObjectStoreConfig>>,
        table: Arc<dyn StorageBackend<Config = TableConfig>>,
    ) -> Self {
        Self {
            disk,
            object_store,
            table,
            options: None,
        }
    }

    /// Attach defaults for the config-free calls.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn options(&self) -> Option<&EngineOptions> {
        self.options.as_ref()
    }

    fn reject<T>(&self, operation: Operation, error: ReplicationError) -> Result<T> {
        metrics::record_rejected(operation, rejection_reason(&error));
        debug!(operation = %operation, error = %error, "Request rejected before I/O");
        Err(error)
    }

    fn default_options(&self, operation: Operation) -> Result<&EngineOptions> {
        match self.options.as_ref() {
            Some(options) => Ok(options),
            None => self.reject(
                operation,
                ReplicationError::config("engine was built without default options"),
            ),
        }
    }

    /// Resolve the key's action and render every path, or fail without I/O.
    fn prepare(
        &self,
        operation: Operation,
        config: &ReplicationConfig,
        key: &StorageKey,
        caller: &CallerContext,
    ) -> Result<RecordPath> {
        let prepared = config.validate().and_then(|_| {
            if !key.has_action() {
                return Err(ReplicationError::bad_request(format!(
                    "{} requires a key with an action, got {}",
                    operation, key
                )));
            }
            key.resolve(caller)?.record_path()
        });
        match prepared {
            Ok(path) => Ok(path),
            Err(e) => self.reject(operation, e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Store
    // ═══════════════════════════════════════════════════════════════════════════

    /// Store `value` under `key` on every eligible backend.
    ///
    /// A derived action is resolved against an empty caller context and so
    /// fails; use [`store_with_caller`](Self::store_with_caller) for those.
    pub async fn store(&self, config: &ReplicationConfig, key: &StorageKey, value: &str) -> Result<()> {
        self.store_with_caller(config, key, &CallerContext::new(), value).await
    }

    /// Store, resolving a derived action against `caller`.
    ///
    /// # Errors
    ///
    /// - `Config`, `BadRequest`, `Validation`, `Resolution`: nothing was written
    /// - `PartialWrite`: at least one backend failed; `committed` hold the record
    #[instrument(skip(self, config, key, caller, value), fields(key = %key))]
    pub async fn store_with_caller(
        &self,
        config: &ReplicationConfig,
        key: &StorageKey,
        caller: &CallerContext,
        value: &str,
    ) -> Result<()> {
        let op = Operation::Store;
        let path = self.prepare(op, config, key, caller)?;
        if value.trim().is_empty() {
            return self.reject(op, ReplicationError::bad_request("correlation id must not be blank"));
        }

        let started = Instant::now();
        let record = CorrelationRecord::new(value);
        let target = path.full.as_str();

        let (disk, object_store, table) = tokio::join!(
            dispatch(BackendKind::Disk, op, target, config.disk.as_ref(), config.eligible(BackendKind::Disk, op), |c| {
                self.disk.store(c, &path, &record)
            }),
            dispatch(
                BackendKind::ObjectStore,
                op,
                target,
                config.object_store.as_ref(),
                config.eligible(BackendKind::ObjectStore, op),
                |c| self.object_store.store(c, &path, &record)
            ),
            dispatch(BackendKind::Table, op, target, config.table.as_ref(), config.eligible(BackendKind::Table, op), |c| {
                self.table.store(c, &path, &record)
            }),
        );
        let attempts: Vec<_> = [disk, object_store, table].into_iter().flatten().collect();
        let attempted = attempts.len();

        let result = reconcile::reduce_store(attempts);
        metrics::record_operation_latency(op, started.elapsed());
        match &result {
            Ok(committed) => {
                metrics::record_store(committed.len(), 0);
                debug!(path = %target, backends = committed.len(), "Stored correlation id");
            }
            Err(e) => {
                let failed = e.failed_backends().len();
                metrics::record_store(attempted - failed, failed);
            }
        }
        result.map(|_| ())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Load
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load the most recent correlation id stored under `key`.
    pub async fn load(&self, config: &ReplicationConfig, key: &StorageKey) -> Result<LoadOutcome> {
        self.load_with_caller(config, key, &CallerContext::new()).await
    }

    /// Load, resolving a derived action against `caller`.
    ///
    /// Backends that fail are logged and treated as holding nothing. Only
    /// when every attempted backend fails is the result an error.
    #[instrument(skip(self, config, key, caller), fields(key = %key))]
    pub async fn load_with_caller(
        &self,
        config: &ReplicationConfig,
        key: &StorageKey,
        caller: &CallerContext,
    ) -> Result<LoadOutcome> {
        let op = Operation::Load;
        let path = self.prepare(op, config, key, caller)?;

        let started = Instant::now();
        let target = path.full.as_str();

        let (disk, object_store, table) = tokio::join!(
            dispatch(BackendKind::Disk, op, target, config.disk.as_ref(), config.eligible(BackendKind::Disk, op), |c| {
                self.disk.load(c, &path)
            }),
            dispatch(
                BackendKind::ObjectStore,
                op,
                target,
                config.object_store.as_ref(),
                config.eligible(BackendKind::ObjectStore, op),
                |c| self.object_store.load(c, &path)
            ),
            dispatch(BackendKind::Table, op, target, config.table.as_ref(), config.eligible(BackendKind::Table, op), |c| {
                self.table.load(c, &path)
            }),
        );
        let attempts: Vec<_> = [disk, object_store, table].into_iter().flatten().collect();

        let result = reconcile::reduce_load(attempts);
        metrics::record_operation_latency(op, started.elapsed());
        match &result {
            Ok(outcome) => {
                metrics::record_load_outcome(outcome.source());
                debug!(path = %target, source = ?outcome.source(), "Loaded correlation id");
            }
            Err(_) => metrics::record_all_backends_failed(op),
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Query
    // ═══════════════════════════════════════════════════════════════════════════

    /// List every key stored directly under the address `key`.
    ///
    /// `key` must have no action. If the table backend takes part, its config
    /// needs a sort key; otherwise the request is rejected before any backend
    /// is contacted. Keys come back ordered by rendered path.
    #[instrument(skip(self, config, key), fields(key = %key))]
    pub async fn query(&self, config: &ReplicationConfig, key: &StorageKey) -> Result<Vec<StorageKey>> {
        let op = Operation::Query;
        let checked = config.validate().and_then(|_| {
            if key.has_action() {
                return Err(ReplicationError::bad_request(format!(
                    "query takes an address without an action, got {}",
                    key
                )));
            }
            match &config.table {
                Some(table) if config.eligible(BackendKind::Table, op) && !table.has_sort_key() => {
                    Err(ReplicationError::bad_request(format!(
                        "table {} has no sort key; query needs one (or dissect query for the table)",
                        table.table_name()
                    )))
                }
                _ => Ok(()),
            }
        });
        if let Err(e) = checked {
            return self.reject(op, e);
        }

        let started = Instant::now();
        let address = key.address_path();
        let target = address.as_str();

        let (disk, object_store, table) = tokio::join!(
            dispatch(BackendKind::Disk, op, target, config.disk.as_ref(), config.eligible(BackendKind::Disk, op), |c| {
                self.disk.query(c, target)
            }),
            dispatch(
                BackendKind::ObjectStore,
                op,
                target,
                config.object_store.as_ref(),
                config.eligible(BackendKind::ObjectStore, op),
                |c| self.object_store.query(c, target)
            ),
            dispatch(BackendKind::Table, op, target, config.table.as_ref(), config.eligible(BackendKind::Table, op), |c| {
                self.table.query(c, target)
            }),
        );
        let attempts: Vec<_> = [disk, object_store, table].into_iter().flatten().collect();

        let result = reconcile::reduce_query(key, attempts);
        metrics::record_operation_latency(op, started.elapsed());
        match &result {
            Ok(keys) => {
                metrics::record_query_results(keys.len());
                debug!(address = %target, found = keys.len(), "Queried correlation keys");
            }
            Err(_) => metrics::record_all_backends_failed(op),
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Calls using the engine's default options
    // ═══════════════════════════════════════════════════════════════════════════

    /// Store under the configured key, deriving the action from `caller`.
    pub async fn store_default(&self, caller: &CallerContext, value: &str) -> Result<()> {
        let options = self.default_options(Operation::Store)?;
        let key = options.key.to_key(None)?;
        self.store_with_caller(&options.sources, &key, caller, value).await
    }

    /// Store under the configured address with an explicit action.
    pub async fn store_action(&self, action: &str, value: &str) -> Result<()> {
        let options = self.default_options(Operation::Store)?;
        let key = options.key.to_key(Some(action))?;
        self.store(&options.sources, &key, value).await
    }

    /// Load from the configured key, deriving the action from `caller`.
    pub async fn load_default(&self, caller: &CallerContext) -> Result<LoadOutcome> {
        let options = self.default_options(Operation::Load)?;
        let key = options.key.to_key(None)?;
        self.load_with_caller(&options.sources, &key, caller).await
    }

    /// Load from the configured address with an explicit action.
    pub async fn load_action(&self, action: &str) -> Result<LoadOutcome> {
        let options = self.default_options(Operation::Load)?;
        let key = options.key.to_key(Some(action))?;
        self.load(&options.sources, &key).await
    }

    /// Query the configured address.
    pub async fn query_default(&self) -> Result<Vec<StorageKey>> {
        let options = self.default_options(Operation::Query)?;
        let address = options.key.to_address()?;
        self.query(&options.sources, &address).await
    }
}

impl std::fmt::Debug for ReplicationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
