//! # Correlation Engine
//!
//! Persists a correlation id against a deterministic key and replicates it
//! across up to three independent storage backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          correlation-engine                               │
//! │                                                                           │
//! │  ┌─────────────┐    ┌───────────────────┐    ┌─────────────────────────┐  │
//! │  │ StorageKey  │───►│ ReplicationEngine │───►│ DiskBackend (tokio::fs) │  │
//! │  │ (key paths) │    │ (fan-out + merge) │    ├─────────────────────────┤  │
//! │  └─────────────┘    └───────────────────┘───►│ ObjectStoreBackend      │  │
//! │         ▲                     ▲          │   ├─────────────────────────┤  │
//! │  ┌─────────────┐    ┌───────────────────┐└──►│ TableBackend            │  │
//! │  │CallerContext│    │ ReplicationConfig │    │ (in-memory / Redis)     │  │
//! │  └─────────────┘    └───────────────────┘    └─────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! 1. **Store**: write one record to every eligible backend concurrently
//! 2. **Load**: read from every eligible backend; the newest record wins
//! 3. **Query**: list the actions stored under an address
//!
//! ## Usage
//!
//! ```rust,no_run
//! use correlation_engine::config::DiskConfig;
//! use correlation_engine::key::{Action, StorageKey};
//! use correlation_engine::{ReplicationConfig, ReplicationEngine};
//!
//! #[tokio::main]
//! async fn main() -> correlation_engine::Result<()> {
//!     let engine = ReplicationEngine::in_memory();
//!     let config = ReplicationConfig::default().with_disk(DiskConfig::new("/var/tmp/correlation")?);
//!     let key = StorageKey::new("billing", Some("uat"), None, Action::explicit("invoice")?)?;
//!
//!     engine.store(&config, &key, "9f1c0c6e").await?;
//!     let outcome = engine.load(&config, &key).await?;
//!     assert_eq!(outcome.value(), Some("9f1c0c6e"));
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod metrics;
pub mod record;

// Re-exports for convenience
pub use backend::{BackendKind, StorageBackend};
pub use config::{DiskConfig, EngineOptions, ObjectStoreConfig, Operation, OperationDissect, ReplicationConfig, StorageKeyOptions, TableConfig};
pub use engine::{LoadOutcome, ReplicationEngine};
pub use error::{BackendFailure, ReplicationError, Result};
pub use key::{Action, CallFrame, CallerContext, KeySegment, RenderMode, StorageKey};
pub use record::CorrelationRecord;
