// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the correlation engine.
//!
//! Errors split into two groups: those raised before any backend is
//! contacted, and those reported after the fan-out. A single failed backend
//! call is never returned on its own; it travels as a [`BackendFailure`]
//! inside `PartialWrite` or `AllBackendsFailed`.
//!
//! # Error Categories
//!
//! | Error Type | Before I/O | Description |
//! |------------|------------|-------------|
//! | `Validation` | Yes | Malformed key segment or negative offset |
//! | `Resolution` | Yes | Derived action has no qualifying caller frame |
//! | `Config` | Yes | No backend configured, or a backend config is invalid |
//! | `BadRequest` | Yes | Operation precondition violated |
//! | `PartialWrite` | No | Store landed on some backends but not all |
//! | `AllBackendsFailed` | No | Load/Query got no answer from any backend |
//!
//! # Partial Writes
//!
//! A [`ReplicationError::PartialWrite`] does **not** mean nothing was
//! written: backends listed in `committed` hold the new record. There is no
//! rollback.

use crate::backend::{AdapterError, BackendKind};
use crate::config::Operation;
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// One failed backend call, as collected by the engine.
#[derive(Debug)]
pub struct BackendFailure {
    pub backend: BackendKind,
    pub path: String,
    pub error: AdapterError,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.backend, self.path, self.error)
    }
}

/// Errors that can occur while storing, loading or querying correlation ids.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A key segment broke the `[A-Za-z0-9._-]+` rule, or an offset was negative.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A derived action could not be resolved against the caller context.
    #[error("Action resolution error: {0}")]
    Resolution(String),

    /// No backend configured, or a backend config failed its invariants.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request itself is malformed for this operation.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Store failed on at least one backend. Writes in `committed` landed.
    #[error("Store failed on {} backend(s): {}", .failures.len(), join_failures(.failures))]
    PartialWrite {
        failures: Vec<BackendFailure>,
        committed: Vec<BackendKind>,
    },

    /// Every attempted backend failed, so there is no answer to reconcile.
    #[error("All backends failed during {operation}: {}", join_failures(.failures))]
    AllBackendsFailed {
        operation: Operation,
        failures: Vec<BackendFailure>,
    },
}

fn join_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReplicationError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// True if the error was raised before any backend was contacted.
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Resolution(_) => true,
            Self::Config(_) => true,
            Self::BadRequest(_) => true,
            Self::PartialWrite { .. } => false,
            Self::AllBackendsFailed { .. } => false,
        }
    }

    /// Backends that failed, for the error kinds that carry them.
    pub fn failed_backends(&self) -> Vec<BackendKind> {
        match self {
            Self::PartialWrite { failures, .. } | Self::AllBackendsFailed { failures, .. } => {
                failures.iter().map(|f| f.backend).collect()
            }
            _ => Vec::new(),
        }
    }
}
