//! TTL path cache
//!
//! Maps a cleaned relative path to the absolute path that last resolved it.
//! Entries expire lazily on read and are swept in bulk by a supervised
//! background task.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;

/// Cache entry. Replaced wholesale on every store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub resolved_path: PathBuf,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Resolved path cache
#[derive(Debug)]
pub struct PathCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl PathCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl())
    }

    /// Look up a key, removing it if its TTL has passed.
    ///
    /// A hit only means the path resolved recently; the file may be gone.
    pub fn load(&self, key: &str) -> Option<PathBuf> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.resolved_path.clone());
            }
        }
        // The read guard is released above. A store that raced in between
        // carries a fresh expiry and survives the conditional removal.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Insert or replace an entry with a fresh TTL.
    pub fn store(&self, key: impl Into<String>, resolved_path: PathBuf) {
        let entry = CacheEntry {
            resolved_path,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove all expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the background sweeper.
    ///
    /// The task holds only a weak reference, so it also ends once the last
    /// `Arc<PathCache>` is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> SweeperHandle {
        let cache = Arc::downgrade(self);
        let cancel = shutdown.child_token();
        let task = tokio::spawn(run_sweeper(cache, interval, cancel.clone()));
        SweeperHandle {
            cancel,
            task: Some(task),
        }
    }
}

async fn run_sweeper(cache: Weak<PathCache>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else { break };
                if cache.is_empty() {
                    continue;
                }
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!("Swept {} expired path(s), {} remaining", removed, cache.len());
                }
            }
        }
    }
    tracing::debug!("Path cache sweeper stopped");
}

/// Owns the sweeper task. Dropping it cancels the task.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Path cache sweeper ended abnormally: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
