// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local filesystem backend.
//!
//! Records are pretty-printed JSON files at `root_path/<full key path>`.
//! A query lists the sub-directories of `root_path/<address>` that hold a
//! record file.

use super::{AdapterError, BackendKind, BoxFuture, StorageBackend, MAX_QUERY_RESULTS};
use crate::config::DiskConfig;
use crate::key::{RecordPath, RECORD_NAME};
use crate::record::CorrelationRecord;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Extension of in-flight staging files.
const STAGING_SUFFIX: &str = ".tmp";

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem adapter. Stateless; all settings come from [`DiskConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskBackend;

impl DiskBackend {
    pub fn new() -> Self {
        Self
    }

    /// Sibling of `file` private to one write, so concurrent stores of the
    /// same key never share a staging file.
    fn staging_path(file: &Path) -> PathBuf {
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{}.{}{}", std::process::id(), seq, STAGING_SUFFIX));
        file.with_file_name(name)
    }

    fn resolve(config: &DiskConfig, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(Path::new(config.root_path()).to_path_buf(), |path, segment| path.join(segment))
    }
}

impl StorageBackend for DiskBackend {
    type Config = DiskConfig;

    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }

    fn store<'a>(
        &'a self,
        config: &'a DiskConfig,
        path: &'a RecordPath,
        record: &'a CorrelationRecord,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let file = Self::resolve(config, &path.full);
            if let Some(dir) = file.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }

            // readers never observe a partially written record
            let staging = Self::staging_path(&file);
            if let Err(e) = tokio::fs::write(&staging, record.to_json()?).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(AdapterError::Io(e));
            }
            if let Err(e) = tokio::fs::rename(&staging, &file).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(AdapterError::Io(e));
            }

            trace!(path = %file.display(), "Stored correlation record on disk");
            Ok(())
        })
    }

    fn load<'a>(
        &'a self,
        config: &'a DiskConfig,
        path: &'a RecordPath,
    ) -> BoxFuture<'a, Option<CorrelationRecord>> {
        Box::pin(async move {
            let file = Self::resolve(config, &path.full);
            match tokio::fs::read(&file).await {
                Ok(bytes) => Ok(Some(CorrelationRecord::from_json(&bytes)?)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(AdapterError::Io(e)),
            }
        })
    }

    fn query<'a>(&'a self, config: &'a DiskConfig, address: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let dir = Self::resolve(config, address);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(AdapterError::Io(e)),
            };

            let mut actions = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                if !tokio::fs::try_exists(entry.path().join(RECORD_NAME)).await? {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    actions.push(name.to_string());
                }
            }

            actions.sort();
            actions.truncate(MAX_QUERY_RESULTS);
            Ok(actions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Action, StorageKey};
    use tempfile::tempdir;

    fn path(action: &str) -> RecordPath {
        StorageKey::new("app", Some("uat"), None, Action::explicit(action).unwrap())
            .unwrap()
            .record_path()
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempdir().unwrap();
        let config = DiskConfig::new(dir.path().to_str().unwrap()).unwrap();
        let record = CorrelationRecord::new("cid-disk");

        DiskBackend.store(&config, &path("save"), &record).await.unwrap();

        let on_disk = dir.path().join("app/uat/save/correlation.json");
        assert!(on_disk.exists());
        assert!(staging_files(&dir.path().join("app/uat/save")).is_empty());

        let loaded = DiskBackend.load(&config, &path("save")).await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    fn staging_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(STAGING_SUFFIX))
            .collect()
    }

    #[test]
    fn test_staging_paths_are_unique_siblings() {
        let file = Path::new("/root/app/save/correlation.json");
        let a = DiskBackend::staging_path(file);
        let b = DiskBackend::staging_path(file);
        assert_ne!(a, b);
        assert_eq!(a.parent(), file.parent());
        assert!(a.to_string_lossy().ends_with(STAGING_SUFFIX));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("correlation.json."));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stores_to_one_path() {
        let dir = tempdir().unwrap();
        let config = std::sync::Arc::new(DiskConfig::new(dir.path().to_str().unwrap()).unwrap());

        for round in 0..10 {
            let mut handles = Vec::new();
            for i in 0..16 {
                let config = config.clone();
                handles.push(tokio::spawn(async move {
                    let record = CorrelationRecord::new(format!("cid-{}-{}", round, i));
                    DiskBackend.store(&config, &path("race"), &record).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        let loaded = DiskBackend.load(&config, &path("race")).await.unwrap().unwrap();
        assert!(loaded.value().starts_with("cid-"));
        assert!(staging_files(&dir.path().join("app/uat/race")).is_empty());
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let config = DiskConfig::new(dir.path().to_str().unwrap()).unwrap();
        // a directory where the record file should be makes the rename fail
        let target = dir.path().join("app/uat/blocked/correlation.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let err = DiskBackend
            .store(&config, &path("blocked"), &CorrelationRecord::new("cid"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Io(_)));
        assert!(staging_files(&dir.path().join("app/uat/blocked")).is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let config = DiskConfig::new(dir.path().to_str().unwrap()).unwrap();
        assert!(DiskBackend.load(&config, &path("nothing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_garbage_is_error() {
        let dir = tempdir().unwrap();
        let config = DiskConfig::new(dir.path().to_str().unwrap()).unwrap();
        let file = dir.path().join("app/uat/bad/correlation.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"not json").unwrap();

        let err = DiskBackend.load(&config, &path("bad")).await.unwrap_err();
        assert!(matches!(err, AdapterError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_query_lists_record_directories() {
        let dir = tempdir().unwrap();
        let config = DiskConfig::new(dir.path().to_str().unwrap()).unwrap();
        for action in ["b", "a"] {
            DiskBackend
                .store(&config, &path(action), &CorrelationRecord::new("cid"))
                .await
                .unwrap();
        }
        // a directory without a record is not an action
        std::fs::create_dir_all(dir.path().join("app/uat/empty")).unwrap();
        // nor is a stray file
        std::fs::write(dir.path().join("app/uat/notes.txt"), b"x").unwrap();

        let actions = DiskBackend.query(&config, "app/uat").await.unwrap();
        assert_eq!(actions, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_query_missing_address_is_empty() {
        let dir = tempdir().unwrap();
        let config = DiskConfig::new(dir.path().to_str().unwrap()).unwrap();
        assert!(DiskBackend.query(&config, "nobody/here").await.unwrap().is_empty());
    }
}
