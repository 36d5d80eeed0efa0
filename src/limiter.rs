// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter keyed by hashed client identifier.
//!
//! Each client gets a counter and a reset timestamp. The first request
//! opens a window; requests inside the window increment the counter until
//! it reaches the limit, after which requests are refused without touching
//! the counter. The next request at or after the reset time opens a fresh
//! window.
//!
//! State optionally lives in a [`PersistentStore`]; mutations mark it dirty
//! and a background writer flushes at most once per debounce interval.

use crate::config::RateLimitConfig;
use crate::error::PersistenceError;
use crate::persist::{PersistentStore, StoreSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-client counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    /// Requests admitted in the current window
    pub count: u32,
    /// Window end, epoch milliseconds
    pub reset_time: i64,
}

impl RateLimitEntry {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.reset_time
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window
        remaining: u32,
        /// Window end, epoch milliseconds
        reset_at_ms: i64,
    },
    /// Request is rate limited
    Limited {
        /// Window end, epoch milliseconds
        reset_at_ms: i64,
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Current wall clock in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Thread-safe rate limiter.
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    /// Client hash -> window counter
    entries: RwLock<HashMap<String, RateLimitEntry>>,
    /// State file, absent in memory-only mode
    store: Option<Arc<PersistentStore>>,
}

impl RateLimiter {
    /// Memory-only limiter: same check semantics, nothing survives a restart.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Limiter backed by the JSON state file at `path`.
    ///
    /// Entries whose window already ended are dropped while loading.
    pub async fn persistent(
        config: RateLimitConfig,
        path: impl Into<PathBuf>,
    ) -> Result<Self, PersistenceError> {
        let (store, snapshot) = PersistentStore::open(path, config.save_debounce()).await?;
        let now = now_ms();
        let entries: HashMap<_, _> = snapshot
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .collect();
        info!(
            path = %store.path().display(),
            active_clients = entries.len(),
            "Persistent rate limiter ready"
        );
        Ok(Self {
            config,
            entries: RwLock::new(entries),
            store: Some(Arc::new(store)),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u32 {
        self.config.max_requests
    }

    /// Check and count one request from `client_id`.
    pub async fn check(&self, client_id: &str) -> RateLimitResult {
        self.check_at(client_id, now_ms()).await
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub async fn check_at(&self, client_id: &str, now_ms: i64) -> RateLimitResult {
        let max = self.config.max_requests;
        let window = i64::try_from(self.config.window_ms).unwrap_or(i64::MAX);

        if max == 0 {
            return RateLimitResult::Limited {
                reset_at_ms: now_ms.saturating_add(window),
                retry_after: self.config.window_duration(),
            };
        }

        // Read-modify-write happens entirely under the write guard.
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(client_id.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_time: i64::MIN,
            });

        let result = if entry.is_expired(now_ms) {
            *entry = RateLimitEntry {
                count: 1,
                reset_time: now_ms.saturating_add(window),
            };
            RateLimitResult::Allowed {
                remaining: max.saturating_sub(1),
                reset_at_ms: entry.reset_time,
            }
        } else if entry.count >= max {
            let wait = entry.reset_time.saturating_sub(now_ms).max(0);
            debug!(client = %client_id, count = entry.count, "Client rate limit exceeded");
            return RateLimitResult::Limited {
                reset_at_ms: entry.reset_time,
                retry_after: Duration::from_millis(wait as u64),
            };
        } else {
            entry.count += 1;
            RateLimitResult::Allowed {
                remaining: max.saturating_sub(entry.count),
                reset_at_ms: entry.reset_time,
            }
        };
        drop(entries);

        self.mark_dirty();
        result
    }

    /// Drop any state held for `client_id`.
    pub async fn reset(&self, client_id: &str) {
        let removed = self.entries.write().await.remove(client_id).is_some();
        if removed {
            debug!(client = %client_id, "Rate limit entry reset");
            self.mark_dirty();
        }
    }

    /// Current window for `client_id`, if one is open. Never mutates.
    pub async fn status(&self, client_id: &str) -> Option<RateLimitEntry> {
        let now = now_ms();
        self.entries
            .read()
            .await
            .get(client_id)
            .filter(|entry| !entry.is_expired(now))
            .copied()
    }

    /// Evict entries whose window has ended. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(now_ms()).await
    }

    pub async fn cleanup_at(&self, now_ms: i64) -> usize {
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now_ms));
            before - entries.len()
        };
        if removed > 0 {
            debug!(removed, "Evicted expired rate limit entries");
            self.mark_dirty();
        }
        removed
    }

    /// Number of clients currently tracked, expired or not.
    pub async fn tracked_clients(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Write pending state now, bypassing the debounce. No-op in memory mode.
    pub async fn flush(&self) {
        if let Some(store) = &self.store {
            self.persist(store).await;
        }
    }

    /// Completed state file writes, `None` in memory mode.
    pub fn state_writes(&self) -> Option<u64> {
        self.store.as_ref().map(|store| store.writes())
    }

    fn mark_dirty(&self) {
        if let Some(store) = &self.store {
            store.mark_dirty();
        }
    }

    async fn snapshot(&self) -> StoreSnapshot {
        let now = now_ms();
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    async fn persist(&self, store: &PersistentStore) {
        if !store.take_dirty() {
            return;
        }
        let snapshot = self.snapshot().await;
        if let Err(e) = store.save(&snapshot).await {
            warn!(
                path = %store.path().display(),
                error = %e,
                "Failed to persist rate limit state, continuing in memory"
            );
            store.mark_dirty();
        }
    }

    /// Start the expired-entry sweep and, when persistent, the debounced
    /// writer. Both stop when the returned handle is shut down.
    pub fn spawn_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(2);

        tasks.push(tokio::spawn(run_sweeper(
            Arc::clone(self),
            self.config.cleanup_interval(),
            shutdown_rx.clone(),
        )));

        if let Some(store) = &self.store {
            tasks.push(tokio::spawn(run_writer(
                Arc::clone(self),
                Arc::clone(store),
                shutdown_rx,
            )));
        }

        MaintenanceHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Background tasks owned by a [`RateLimiter`].
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stop the background tasks and wait for them to exit.
    ///
    /// Pending state is not written here; call [`RateLimiter::flush`] after.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Rate limiter task ended abnormally");
            }
        }
    }
}

async fn run_sweeper(
    limiter: Arc<RateLimiter>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                limiter.cleanup().await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_writer(
    limiter: Arc<RateLimiter>,
    store: Arc<PersistentStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = store.dirtied() => {}
            _ = shutdown.changed() => break,
        }
        // Coalesce everything that arrives during the debounce interval.
        tokio::select! {
            _ = tokio::time::sleep(store.debounce()) => {}
            _ = shutdown.changed() => break,
        }
        limiter.persist(&store).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn limiter(max: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::in_memory(RateLimitConfig::in_memory(max, window_ms))
    }

    #[tokio::test]
    async fn test_nth_allowed_next_denied() {
        for max in 1..=6 {
            let limiter = limiter(max, 60_000);
            for i in 0..max {
                let result = limiter.check_at("client", T0 + i as i64).await;
                assert_eq!(
                    result,
                    RateLimitResult::Allowed {
                        remaining: max - i - 1,
                        reset_at_ms: T0 + 60_000,
                    }
                );
            }
            match limiter.check_at("client", T0 + 100).await {
                RateLimitResult::Limited {
                    reset_at_ms,
                    retry_after,
                } => {
                    assert_eq!(reset_at_ms, T0 + 60_000);
                    assert_eq!(retry_after, Duration::from_millis(59_900));
                }
                other => panic!("max={max}: expected limit, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_attempts_do_not_count() {
        let limiter = limiter(2, 60_000);
        let now = now_ms();
        for _ in 0..5 {
            limiter.check_at("c", now).await;
        }
        assert_eq!(limiter.status("c").await.map(|e| e.count), Some(2));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(2, 1_000);
        assert!(limiter.check_at("c", T0).await.is_allowed());
        assert!(limiter.check_at("c", T0 + 1).await.is_allowed());
        assert!(!limiter.check_at("c", T0 + 999).await.is_allowed());

        // reset_time itself counts as passed
        let result = limiter.check_at("c", T0 + 1_000).await;
        assert_eq!(
            result,
            RateLimitResult::Allowed {
                remaining: 1,
                reset_at_ms: T0 + 2_000,
            }
        );
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.check_at("a", T0).await.is_allowed());
        assert!(!limiter.check_at("a", T0).await.is_allowed());
        assert!(limiter.check_at("b", T0).await.is_allowed());
    }

    #[tokio::test]
    async fn test_reset_and_status() {
        let limiter = limiter(1, 60_000);
        assert_eq!(limiter.status("c").await, None);

        limiter.check("c").await;
        let before = limiter.status("c").await.unwrap();
        assert_eq!(before.count, 1);
        // status is a pure read
        assert_eq!(limiter.status("c").await, Some(before));
        assert!(!limiter.check("c").await.is_allowed());

        limiter.reset("c").await;
        assert_eq!(limiter.status("c").await, None);
        assert!(limiter.check("c").await.is_allowed());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_expired_only() {
        let limiter = limiter(5, 1_000);
        limiter.check_at("old", T0).await;
        limiter.check_at("new", T0 + 800).await;

        assert_eq!(limiter.cleanup_at(T0 + 1_000).await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
        assert_eq!(limiter.cleanup_at(T0 + 1_000).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_max() {
        let limiter = Arc::new(limiter(10, 60_000));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("same-client").await.is_allowed() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_memory_mode_flush_is_noop() {
        let limiter = limiter(1, 60_000);
        assert!(!limiter.is_persistent());
        limiter.check("c").await;
        limiter.flush().await;
    }

    #[tokio::test]
    async fn test_debounced_writer_persists_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        let config = RateLimitConfig {
            max_requests: 5,
            window_ms: 60_000,
            persist_path: Some(path.clone()),
            save_debounce_ms: 50,
            cleanup_interval_secs: 60,
        };
        let limiter = Arc::new(RateLimiter::persistent(config, &path).await.unwrap());
        let handle = limiter.spawn_maintenance();

        for _ in 0..3 {
            limiter.check("c").await;
        }
        assert!(!path.exists(), "write must wait for the debounce interval");

        tokio::time::sleep(Duration::from_millis(400)).await;
        let saved: StoreSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.get("c").map(|e| e.count), Some(3));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_after_shutdown_writes_pending_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        let config = RateLimitConfig {
            save_debounce_ms: 60_000,
            ..RateLimitConfig::in_memory(5, 60_000)
        };
        let limiter = Arc::new(RateLimiter::persistent(config, &path).await.unwrap());
        let handle = limiter.spawn_maintenance();

        limiter.check("c").await;
        handle.shutdown().await;
        assert!(!path.exists());

        limiter.flush().await;
        let saved: StoreSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.get("c").map(|e| e.count), Some(1));
    }

    #[tokio::test]
    async fn test_zero_limit_admits_nobody() {
        let limiter = limiter(0, 60_000);
        assert_eq!(
            limiter.check_at("c", T0).await,
            RateLimitResult::Limited {
                reset_at_ms: T0 + 60_000,
                retry_after: Duration::from_secs(60),
            }
        );
        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[tokio::test]
    async fn test_at_most_one_write_per_debounce_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        let config = RateLimitConfig {
            save_debounce_ms: 200,
            ..RateLimitConfig::in_memory(100, 60_000)
        };
        let limiter = Arc::new(RateLimiter::persistent(config, &path).await.unwrap());
        let handle = limiter.spawn_maintenance();

        // Two bursts inside the first interval coalesce into one write.
        for _ in 0..20 {
            limiter.check("c").await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..20 {
            limiter.check("c").await;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(limiter.state_writes(), Some(1));

        // A burst in the next interval produces exactly one more.
        for _ in 0..20 {
            limiter.check("c").await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(limiter.state_writes(), Some(2));

        let saved: StoreSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.get("c").map(|e| e.count), Some(60));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_evicts_and_rewrites_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        let config = RateLimitConfig {
            max_requests: 5,
            window_ms: 200,
            persist_path: Some(path.clone()),
            save_debounce_ms: 10,
            cleanup_interval_secs: 1,
        };
        let limiter = Arc::new(RateLimiter::persistent(config, &path).await.unwrap());
        let handle = limiter.spawn_maintenance();

        limiter.check("c").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let saved: StoreSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(saved.contains_key("c"));

        // The expired entry stays in memory until the sweep runs.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(limiter.tracked_clients().await, 1);

        let mut evicted = false;
        for _ in 0..60 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if limiter.tracked_clients().await == 0 && limiter.state_writes() == Some(2) {
                evicted = true;
                break;
            }
        }
        handle.shutdown().await;
        assert!(evicted, "sweeper never evicted the expired entry");

        let saved: StoreSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(saved.is_empty());
    }
}
