// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! On-disk state for the rate limiter.
//!
//! The whole store is one JSON object (`{clientHash: {count, resetTime}}`),
//! read once at startup and rewritten wholesale. Writes go through a temp
//! file and a rename so a crash mid-write leaves the previous state intact.

use crate::error::PersistenceError;
use crate::limiter::RateLimitEntry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Serialized shape of the store.
pub type StoreSnapshot = HashMap<String, RateLimitEntry>;

/// JSON state file plus the dirty flag that drives debounced writes.
#[derive(Debug)]
pub struct PersistentStore {
    path: PathBuf,
    debounce: Duration,
    dirty: AtomicBool,
    wake: Notify,
    /// Completed writes since open
    writes: AtomicU64,
}

impl PersistentStore {
    /// Prepare the state file location and load whatever it holds.
    ///
    /// Fails only when the parent directory cannot be created. A missing or
    /// unreadable file yields an empty snapshot.
    pub async fn open(
        path: impl Into<PathBuf>,
        debounce: Duration,
    ) -> Result<(Self, StoreSnapshot), PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = match load(&path).await {
            Ok(Some(snapshot)) => {
                info!(path = %path.display(), entries = snapshot.len(), "Loaded rate limit state");
                snapshot
            }
            Ok(None) => {
                debug!(path = %path.display(), "No rate limit state file, starting empty");
                StoreSnapshot::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable rate limit state, starting empty"
                );
                StoreSnapshot::new()
            }
        };

        let store = Self {
            path,
            debounce,
            dirty: AtomicBool::new(false),
            wake: Notify::new(),
            writes: AtomicU64::new(0),
        };
        Ok((store, snapshot))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record that the in-memory store diverged from disk and wake the writer.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Number of successful writes since the store was opened.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Wait until something marks the store dirty.
    pub async fn dirtied(&self) {
        self.wake.notified().await;
    }

    /// Write `snapshot` to disk, replacing the previous file.
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec(snapshot)?;
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            path = %self.path.display(),
            entries = snapshot.len(),
            writes,
            "Saved rate limit state"
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn load(path: &Path) -> Result<Option<StoreSnapshot>, PersistenceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}
