//! Multi-mount path resolution
//!
//! A request path is resolved cache-first. On a miss (or a stale hit) every
//! configured mount is probed concurrently and the first successful open
//! wins. Mount order never matters; latency decides.

pub mod cache;
pub mod opener;
pub mod path;

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Mount, SearchConfig};
use crate::error::{GatewayError, Result};

pub use cache::PathCache;
pub use opener::{FsOpener, Opener};
pub use path::clean_relative_path;

/// Where a resolved handle came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Cache,
    Mount(String),
}

/// An opened file and the absolute path it was opened from.
///
/// The holder owns `handle` and releases it by dropping it.
#[derive(Debug)]
pub struct Resolved<H> {
    pub handle: H,
    pub path: PathBuf,
    pub source: Source,
}

enum ProbeOutcome {
    Won,
    Lost,
    Failed,
    Skipped,
}

enum SearchEnd {
    Won,
    Exhausted,
    TimedOut,
}

type WinnerSlot<H> = Arc<Mutex<Option<Resolved<H>>>>;

pub struct MountResolver<O: Opener = FsOpener> {
    mounts: Arc<[Mount]>,
    cache: Arc<PathCache>,
    opener: Arc<O>,
    timeout: Duration,
    grace_period: Duration,
}

impl MountResolver<FsOpener> {
    pub fn new(mounts: Vec<Mount>, cache: Arc<PathCache>, search: &SearchConfig) -> Self {
        Self::with_opener(mounts, cache, search, FsOpener)
    }
}

impl<O: Opener> MountResolver<O> {
    pub fn with_opener(
        mounts: Vec<Mount>,
        cache: Arc<PathCache>,
        search: &SearchConfig,
        opener: O,
    ) -> Self {
        Self {
            mounts: mounts.into(),
            cache,
            opener: Arc::new(opener),
            timeout: search.timeout(),
            grace_period: search.grace_period(),
        }
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn cache(&self) -> &Arc<PathCache> {
        &self.cache
    }

    /// Resolve a client-supplied relative path to an opened handle.
    pub async fn resolve(&self, relative_path: &str) -> Result<Resolved<O::Handle>> {
        let key = clean_relative_path(relative_path)?;

        if let Some(cached) = self.cache.load(&key) {
            match self.opener.open(&cached).await {
                Ok(handle) => {
                    tracing::debug!("Cache hit: {} -> {}", key, cached.display());
                    return Ok(Resolved {
                        handle,
                        path: cached,
                        source: Source::Cache,
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        "Cached path {} is stale ({}), searching mounts",
                        cached.display(),
                        e
                    );
                    self.cache.invalidate(&key);
                }
            }
        }

        let resolved = self.fan_out(&key).await?;
        if let Source::Mount(mount) = &resolved.source {
            tracing::info!(mount = %mount, "File opened: {}", resolved.path.display());
        }
        self.cache.store(key, resolved.path.clone());
        Ok(resolved)
    }

    async fn fan_out(&self, key: &str) -> Result<Resolved<O::Handle>> {
        if self.mounts.is_empty() {
            return Err(GatewayError::NotFound(key.to_string()));
        }

        let cancel = CancellationToken::new();
        let slot: WinnerSlot<O::Handle> = Arc::new(Mutex::new(None));
        let mut probes = JoinSet::new();

        for mount in self.mounts.iter() {
            probes.spawn(probe(
                Arc::clone(&self.opener),
                mount.name.clone(),
                mount.root.join(key),
                Arc::clone(&slot),
                cancel.clone(),
            ));
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut failures = 0usize;

        let end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break SearchEnd::Won,
                joined = probes.join_next() => match joined {
                    Some(Ok(ProbeOutcome::Failed)) => failures += 1,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        failures += 1;
                        tracing::warn!("Mount probe task failed: {}", e);
                    }
                    None => break SearchEnd::Exhausted,
                },
                _ = &mut deadline => break SearchEnd::TimedOut,
            }
        };

        // After this point no probe can deposit into the slot: each one
        // checks the token while holding the slot lock.
        cancel.cancel();
        let winner = slot.lock().take();
        self.drain(probes).await;

        match (winner, end) {
            (Some(resolved), _) => Ok(resolved),
            (None, SearchEnd::TimedOut) => {
                tracing::warn!(
                    "Search for {} timed out after {:?} ({} mount(s) failed)",
                    key,
                    self.timeout,
                    failures
                );
                Err(GatewayError::SearchTimeout {
                    path: key.to_string(),
                    timeout_ms: self.timeout.as_millis(),
                })
            }
            (None, _) => {
                tracing::warn!(
                    "{} not found in any of {} mount(s)",
                    key,
                    self.mounts.len()
                );
                Err(GatewayError::NotFound(key.to_string()))
            }
        }
    }

    /// Wait for losing probes, up to the grace period.
    ///
    /// Probes still running afterwards are detached. They observe the
    /// cancelled token once their open returns and close their own handle.
    async fn drain(&self, mut probes: JoinSet<ProbeOutcome>) {
        if probes.is_empty() {
            return;
        }
        let drained = tokio::time::timeout(self.grace_period, async {
            while probes.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!("Detaching {} in-flight mount probe(s)", probes.len());
            probes.detach_all();
        }
    }
}

async fn probe<O: Opener>(
    opener: Arc<O>,
    mount: String,
    path: PathBuf,
    slot: WinnerSlot<O::Handle>,
    cancel: CancellationToken,
) -> ProbeOutcome {
    if cancel.is_cancelled() {
        return ProbeOutcome::Skipped;
    }

    let handle = match opener.open(&path).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(mount = %mount, "Open failed for {}: {}", path.display(), e);
            return ProbeOutcome::Failed;
        }
    };

    {
        let mut winner = slot.lock();
        if winner.is_none() && !cancel.is_cancelled() {
            *winner = Some(Resolved {
                handle,
                path,
                source: Source::Mount(mount),
            });
            drop(winner);
            cancel.cancel();
            return ProbeOutcome::Won;
        }
    }

    // someone else won, or the search already ended
    drop(handle);
    ProbeOutcome::Lost
}
