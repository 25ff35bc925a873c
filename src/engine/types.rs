//! Engine outcome types.
//!
//! # Load Outcomes
//!
//! ```text
//! eligible backends ──→ each: record | missing | error
//!                              │
//!            ┌─────────────────┼──────────────────────┐
//!            ↓                 ↓                      ↓
//!   ≥1 record found    all missing / some failed   all failed
//!            │                 │                      │
//!            ↓                 ↓                      ↓
//!   Found (newest wins)    NotFound          AllBackendsFailed (error)
//! ```

use crate::backend::BackendKind;
use crate::error::BackendFailure;
use crate::record::CorrelationRecord;
use chrono::{DateTime, Utc};

/// Result of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The most recent record among the backends that answered.
    Found {
        value: String,
        created: DateTime<Utc>,
        /// Backend whose record won reconciliation.
        source: BackendKind,
    },

    /// No eligible backend holds a record for the key.
    NotFound,
}

impl LoadOutcome {
    pub(crate) fn found(record: CorrelationRecord, source: BackendKind) -> Self {
        LoadOutcome::Found {
            value: record.value().to_string(),
            created: record.created(),
            source,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, LoadOutcome::Found { .. })
    }

    /// The correlation id, if one was found.
    pub fn value(&self) -> Option<&str> {
        match self {
            LoadOutcome::Found { value, .. } => Some(value),
            LoadOutcome::NotFound => None,
        }
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        match self {
            LoadOutcome::Found { created, .. } => Some(*created),
            LoadOutcome::NotFound => None,
        }
    }

    pub fn source(&self) -> Option<BackendKind> {
        match self {
            LoadOutcome::Found { source, .. } => Some(*source),
            LoadOutcome::NotFound => None,
        }
    }

    /// Consume the outcome, keeping only the id.
    pub fn into_value(self) -> Option<String> {
        match self {
            LoadOutcome::Found { value, .. } => Some(value),
            LoadOutcome::NotFound => None,
        }
    }
}

/// One backend's answer within a fan-out.
#[derive(Debug)]
pub(crate) struct Attempt<T> {
    pub backend: BackendKind,
    pub path: String,
    pub result: crate::backend::AdapterResult<T>,
}

impl<T> Attempt<T> {
    /// Split into the answer or a collected failure.
    pub fn into_parts(self) -> Result<(BackendKind, T), BackendFailure> {
        match self.result {
            Ok(value) => Ok((self.backend, value)),
            Err(error) => Err(BackendFailure {
                backend: self.backend,
                path: self.path,
                error,
            }),
        }
    }
}
