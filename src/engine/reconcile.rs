// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reduction of per-backend answers into one outcome.
//!
//! Attempts arrive in backend priority order (disk, object store, table).
//! Ties on `created` go to the earliest attempt.

use super::types::{Attempt, LoadOutcome};
use crate::backend::BackendKind;
use crate::config::Operation;
use crate::error::{BackendFailure, ReplicationError, Result};
use crate::key::{KeySegment, RenderMode, StorageKey};
use crate::record::CorrelationRecord;
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn all_failed(operation: Operation, attempted: usize, failures: Vec<BackendFailure>) -> Result<()> {
    if attempted > 0 && failures.len() == attempted {
        return Err(ReplicationError::AllBackendsFailed { operation, failures });
    }
    Ok(())
}

/// Store succeeds only if every attempted write did.
pub(crate) fn reduce_store(attempts: Vec<Attempt<()>>) -> Result<Vec<BackendKind>> {
    let mut committed = Vec::new();
    let mut failures = Vec::new();
    for attempt in attempts {
        match attempt.into_parts() {
            Ok((backend, ())) => committed.push(backend),
            Err(failure) => failures.push(failure),
        }
    }

    if failures.is_empty() {
        Ok(committed)
    } else {
        Err(ReplicationError::PartialWrite { failures, committed })
    }
}

/// Newest record wins; failed backends count as not found unless all failed.
pub(crate) fn reduce_load(attempts: Vec<Attempt<Option<CorrelationRecord>>>) -> Result<LoadOutcome> {
    let attempted = attempts.len();
    let mut failures = Vec::new();
    let mut newest: Option<(CorrelationRecord, BackendKind)> = None;

    for attempt in attempts {
        match attempt.into_parts() {
            Ok((backend, Some(record))) => {
                let replace = match &newest {
                    Some((best, _)) => record.created() > best.created(),
                    None => true,
                };
                if replace {
                    newest = Some((record, backend));
                }
            }
            Ok((backend, None)) => debug!(backend = %backend, "No record stored"),
            Err(failure) => failures.push(failure),
        }
    }

    all_failed(Operation::Load, attempted, failures)?;

    Ok(match newest {
        Some((record, source)) => LoadOutcome::found(record, source),
        None => LoadOutcome::NotFound,
    })
}

/// Union of listed actions as full keys, de-duplicated and ordered by path.
pub(crate) fn reduce_query(address: &StorageKey, attempts: Vec<Attempt<Vec<String>>>) -> Result<Vec<StorageKey>> {
    let attempted = attempts.len();
    let mut failures = Vec::new();
    let mut keys: BTreeMap<String, StorageKey> = BTreeMap::new();

    for attempt in attempts {
        let (backend, actions) = match attempt.into_parts() {
            Ok(answer) => answer,
            Err(failure) => {
                failures.push(failure);
                continue;
            }
        };

        for action in actions {
            let segment = match KeySegment::new(action.as_str()) {
                Ok(segment) => segment,
                Err(_) => {
                    warn!(backend = %backend, action = %action, "Skipping invalid action name");
                    continue;
                }
            };
            let key = address.with_action(segment);
            let path = key.render(RenderMode::Full)?;
            keys.entry(path).or_insert(key);
        }
    }

    all_failed(Operation::Query, attempted, failures)?;

    Ok(keys.into_values().collect())
}
