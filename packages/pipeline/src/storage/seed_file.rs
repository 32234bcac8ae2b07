//! On-disk checkpoint artifact for generated search URLs.
//!
//! An ordered JSON array of `{ "url": ..., "value": bool }` records where
//! `value = true` means the URL has been fully processed. This is the
//! URL-generation stage's checkpoint store: it supports the same semantics
//! as the database-backed one (idempotent re-load, mark-complete, persist)
//! and is implemented as a [`CheckpointStore`] so the stage runner drives
//! it like any other collection. Progress is persisted after every mark so
//! an interrupted run loses at most the in-flight item.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::CheckpointStore;
use crate::types::{CheckpointRecord, CheckpointStatus, Stage, StatusCounts, UrlSeed};

pub struct SeedFile {
    path: PathBuf,
    entries: Mutex<Vec<UrlSeed>>,
}

impl SeedFile {
    /// Load the artifact, or start empty when the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Invalid seed file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn persist(path: &Path, entries: &[UrlSeed]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SeedFile {
    async fn register(&self, _stage: Stage, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let mut inserted = 0;
        for key in keys {
            if !entries.iter().any(|e| &e.url == key) {
                entries.push(UrlSeed {
                    url: key.clone(),
                    value: false,
                });
                inserted += 1;
            }
        }
        if inserted > 0 {
            Self::persist(&self.path, &entries)?;
        }
        Ok(inserted)
    }

    async fn pending(&self, _stage: Stage) -> Result<Vec<CheckpointRecord>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| !e.value)
            .map(|e| CheckpointRecord::pending(e.url.clone()))
            .collect())
    }

    async fn mark(
        &self,
        _stage: Stage,
        key: &str,
        status: CheckpointStatus,
        _attempts: u32,
        _error: Option<&str>,
    ) -> Result<()> {
        // The two-state artifact only records completion; failed entries
        // stay pending so the next run retries them.
        if status != CheckpointStatus::Done {
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.url == key) {
            if !entry.value {
                entry.value = true;
                Self::persist(&self.path, &entries)?;
            }
        }
        Ok(())
    }

    async fn counts(&self, _stage: Stage) -> Result<StatusCounts> {
        let entries = self.entries.lock().await;
        let done = entries.iter().filter(|e| e.value).count() as u64;
        Ok(StatusCounts {
            pending: entries.len() as u64 - done,
            done,
            ..StatusCounts::default()
        })
    }

    async fn requeue_retryable(&self, _stage: Stage) -> Result<u64> {
        // Failures are never marked into the artifact, so there is nothing
        // to re-queue.
        Ok(0)
    }
}
