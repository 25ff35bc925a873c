// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The persisted correlation record.
//!
//! On disk and in the object store the record is JSON:
//!
//! ```json
//! {
//!   "correlationId": "9f1c0c6e-0d3a-4c36-9d0e-2f9b5f8a1f52",
//!   "created": "2026-01-04T10:15:30.123456Z"
//! }
//! ```
//!
//! The table backend stores the same two fields as string attributes.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Attribute name of the correlation id.
pub const VALUE_ATTRIBUTE: &str = "correlationId";

/// Attribute name of the creation timestamp.
pub const CREATED_ATTRIBUTE: &str = "created";

/// A correlation id and the moment it was recorded.
///
/// `created` is the only thing used to pick between backends on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    #[serde(rename = "correlationId")]
    value: String,
    created: DateTime<Utc>,
}

impl CorrelationRecord {
    /// Stamp a new record with the current UTC time.
    ///
    /// Truncated to microseconds so every backend reads back the same instant.
    pub fn new(value: impl Into<String>) -> Self {
        Self::with_created(value, Utc::now().trunc_subsecs(6))
    }

    /// Build a record with a known timestamp (used when reading back).
    pub fn with_created(value: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            created,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// ISO-8601 UTC timestamp, microsecond precision.
    pub fn created_iso(&self) -> String {
        self.created.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Parse a timestamp written by [`created_iso`](Self::created_iso).
    pub fn parse_created(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
    }
}
