// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backend adapters.
//!
//! Every backend exposes the same three primitives to the engine, whatever
//! the medium underneath:
//!
//! | Call | Returns |
//! |------|---------|
//! | `store(config, path, record)` | `()` |
//! | `load(config, path)` | `Some(record)` or `None` when nothing is stored |
//! | `query(config, address)` | action names found under the address |
//!
//! Adapters own their error classification (missing vs failed) and report
//! failures as [`AdapterError`]. They never panic across the boundary.
//!
//! # Implementations
//!
//! - [`DiskBackend`]: local filesystem via `tokio::fs`
//! - [`ObjectStoreBackend`]: any [`ObjectClient`] (bucket + key blobs)
//! - [`TableBackend`]: any [`TableClient`] (partition/sort key items)
//!
//! Clients are injected as `Arc`s and live as long as the caller wants;
//! there are no process-wide singletons here.
//!
//! # Example
//!
//! ```rust,no_run
//! use correlation_engine::backend::{BoxFuture, ObjectClient};
//!
//! struct MyBucket { /* SDK client */ }
//!
//! impl ObjectClient for MyBucket {
//!     fn put_object<'a>(&'a self, _bucket: &'a str, _key: &'a str, _body: Vec<u8>, _content_type: &'a str) -> BoxFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn get_object<'a>(&'a self, _bucket: &'a str, _key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn list_objects<'a>(&'a self, _bucket: &'a str, _prefix: &'a str, _max_keys: usize) -> BoxFuture<'a, Vec<String>> {
//!         Box::pin(async move { Ok(vec![]) })
//!     }
//! }
//! ```

mod disk;
mod object_store;
mod redis_table;
mod table;

pub use disk::DiskBackend;
pub use object_store::{InMemoryObjectClient, ObjectClient, ObjectStoreBackend, RECORD_CONTENT_TYPE};
pub use redis_table::RedisTableClient;
pub use table::{AttributeValue, InMemoryTableClient, TableBackend, TableClient, TableItem, TableKey};

use crate::key::{RecordPath, RECORD_NAME};
use crate::record::CorrelationRecord;
use std::fmt;
use thiserror::Error;

/// Cap on action names one backend returns for a single query.
pub const MAX_QUERY_RESULTS: usize = 100;

/// Result type for adapter calls.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Boxed future returned by adapter and client calls.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, AdapterResult<T>>;

/// Which physical medium a backend writes to.
///
/// The declaration order is also the reconciliation priority when two
/// backends hold records with identical timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    Disk,
    ObjectStore,
    Table,
}

impl BackendKind {
    /// All kinds, in priority order.
    pub const ALL: [BackendKind; 3] = [BackendKind::Disk, BackendKind::ObjectStore, BackendKind::Table];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Disk => "disk",
            BackendKind::ObjectStore => "object-store",
            BackendKind::Table => "table",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single backend call.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Filesystem or socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored item exists but is missing fields or holds garbage.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Any other client-reported failure (SDK error, timeout, throttling).
    #[error("Client error: {0}")]
    Client(String),
}

/// Uniform Store/Load/Query over one storage medium.
///
/// `Config` is the backend's own settings type, so the engine can hold each
/// kind as `Arc<dyn StorageBackend<Config = ...>>` and tests can swap in
/// spies.
pub trait StorageBackend: Send + Sync + 'static {
    type Config: Send + Sync;

    fn kind(&self) -> BackendKind;

    /// Write `record` at `path`, replacing what was there.
    fn store<'a>(
        &'a self,
        config: &'a Self::Config,
        path: &'a RecordPath,
        record: &'a CorrelationRecord,
    ) -> BoxFuture<'a, ()>;

    /// Read the record at `path`. `Ok(None)` means nothing is stored.
    fn load<'a>(
        &'a self,
        config: &'a Self::Config,
        path: &'a RecordPath,
    ) -> BoxFuture<'a, Option<CorrelationRecord>>;

    /// List action names stored directly under `address`.
    fn query<'a>(&'a self, config: &'a Self::Config, address: &'a str) -> BoxFuture<'a, Vec<String>>;
}

/// Extract the action from `action/correlation.json`.
pub(crate) fn action_from_suffix(suffix: &str) -> Option<&str> {
    let suffix = suffix.trim_start_matches('/');
    match suffix.split_once('/') {
        Some((action, RECORD_NAME)) if !action.is_empty() => Some(action),
        _ => None,
    }
}
