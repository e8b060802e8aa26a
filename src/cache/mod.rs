//! Bundle cache - the coordinator.
//!
//! Owns the process-wide map from cache key to live entry and ties
//! content processing, output persistence, and dependency watching into
//! one lifecycle:
//!
//! ```text
//! add(spec) → render → write → register watch
//!                ↑                    │
//!                └── Changed ─────────┤
//!        re-register ←─ Evicted/Expired
//! ```
//!
//! Concurrency: `add`/`remove` run on caller threads while watch
//! callbacks arrive on monitor threads. A per-key monotonic generation
//! counter resolves overlapping rebuilds — each rebuild captures the
//! counter at start and only installs its result if no newer generation
//! has started since. `remove` bumps the counter, so it wins against
//! any in-flight rebuild. The generation table's mutex doubles as the
//! commit lock for install/remove/rewatch.

mod entry;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::bundle::BundleSpec;
use crate::error::BundleError;
use crate::hashing::ContentHash;
use crate::logger;
use crate::monitor::{PathMonitor, WatchCallback, WatchEvent, WatchReason, WatchRequest};
use crate::process;
use crate::store::ArtifactStore;

pub use entry::CacheEntry;

pub const DEFAULT_MAX_BUNDLES: usize = 256;

/// Rebuilds slower than this are logged as a warning.
const SLOW_REBUILD_WARN: Duration = Duration::from_secs(10);

/// The self-healing bundle cache.
pub struct BundleCache {
    monitor: Arc<dyn PathMonitor>,
    store: ArtifactStore,
    entries: DashMap<String, CacheEntry>,
    /// Latest started generation per key; doubles as the commit lock.
    generations: Mutex<FxHashMap<String, u64>>,
    limit: usize,
}

impl BundleCache {
    pub fn new(monitor: Arc<dyn PathMonitor>, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            monitor,
            store: ArtifactStore::new(),
            entries: DashMap::new(),
            generations: Mutex::new(FxHashMap::default()),
            limit: limit.max(1),
        })
    }

    /// Build a bundle and install it under its cache key.
    ///
    /// On any failure nothing is installed — a build that never
    /// succeeded has nothing to self-heal.
    pub fn add(self: &Arc<Self>, spec: BundleSpec) -> Result<(), BundleError> {
        let key = spec.cache_key();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.limit {
            return Err(BundleError::CapacityReached { limit: self.limit });
        }

        let generation = self.begin_generation(&key);
        let Some(version) = self.rebuild(&key, &spec, generation)? else {
            return Ok(()); // superseded by a newer add or a remove
        };
        self.install(key, spec, generation, version)?;
        Ok(())
    }

    /// Tear down a bundle's watch and drop its entry.
    ///
    /// Idempotent when the key is absent. Bumping the generation first
    /// makes any in-flight rebuild for the key discard its result.
    pub fn remove(&self, key: &str) {
        let mut generations = self.generations.lock();
        *generations.entry(key.to_string()).or_insert(0) += 1;

        if let Some((_, entry)) = self.entries.remove(key) {
            self.monitor.unregister(&entry.handle);
            crate::debug!("bundle"; "removed {}", entry.spec.label());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current content version of a cached bundle's primary output.
    pub fn version_of(&self, key: &str) -> Option<ContentHash> {
        self.entries.get(key).map(|e| e.version)
    }

    /// Entry point for monitor callbacks.
    pub(crate) fn on_watch_event(self: &Arc<Self>, event: WatchEvent) {
        match event.reason {
            WatchReason::Changed => self.regenerate(&event.key),
            WatchReason::Evicted | WatchReason::Expired => {
                self.rewatch(&event.key, event.reason);
            }
        }
    }

    /// Full regenerate: reprocess current source contents, rewrite
    /// outputs, re-register the watch. This is the self-healing path.
    ///
    /// Runs on a monitor thread; failures cannot propagate to a caller,
    /// so they are logged and the stale entry (and its registration)
    /// survives for the next change to heal.
    fn regenerate(self: &Arc<Self>, key: &str) {
        let Some(spec) = self.entries.get(key).map(|e| e.spec.clone()) else {
            crate::debug!("watch"; "change for unknown key {key}, ignoring");
            return;
        };

        let generation = self.begin_generation(key);
        match self.rebuild(key, &spec, generation) {
            Ok(Some(version)) => match self.install(key.to_string(), spec.clone(), generation, version) {
                Ok(installed) => {
                    if installed {
                        logger::status_success(&format!("rebuilt: {}", spec.label()));
                    }
                }
                Err(e) => crate::log!(
                    "watch";
                    "re-registering {} failed: {e}; entry is stale until the next change",
                    spec.label()
                ),
            },
            Ok(None) => crate::debug!("watch"; "rebuild of {key} superseded"),
            Err(e) => {
                logger::status_error(&format!("rebuild failed: {}", spec.label()), &e.to_string());
            }
        }
    }

    /// Cheap path for Evicted/Expired: the artifact is untouched, only
    /// the monitor shed the registration. Re-register the same watch
    /// set so monitoring never lapses, and replace the entry wholesale
    /// with the fresh handle.
    fn rewatch(self: &Arc<Self>, key: &str, reason: WatchReason) {
        let generations = self.generations.lock();

        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            crate::debug!("watch"; "{} for unknown key {key}, ignoring", reason.label());
            return;
        };

        let request = WatchRequest {
            key: key.to_string(),
            paths: entry.spec.watch_set(),
        };
        match self.monitor.register(request, self.callback()) {
            Ok(handle) => {
                self.entries
                    .insert(key.to_string(), CacheEntry { handle, ..entry });
                crate::debug!("watch"; "re-registered {key} after {}", reason.label());
            }
            Err(e) => crate::log!(
                "watch";
                "re-register of {key} failed after {}: {e}; entry is unwatched",
                reason.label()
            ),
        }

        drop(generations);
    }

    /// Start a new generation for a key and return it.
    fn begin_generation(&self, key: &str) -> u64 {
        let mut generations = self.generations.lock();
        let generation = generations.entry(key.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn latest_generation(&self, key: &str) -> u64 {
        self.generations.lock().get(key).copied().unwrap_or(0)
    }

    /// Render and persist a bundle's outputs.
    ///
    /// Returns `None` without writing when a newer generation started in
    /// the meantime — the newer rebuild owns the outputs now.
    fn rebuild(
        &self,
        key: &str,
        spec: &BundleSpec,
        generation: u64,
    ) -> Result<Option<ContentHash>, BundleError> {
        let start = Instant::now();
        let rendered = process::render(spec, &self.store)?;
        if start.elapsed() > SLOW_REBUILD_WARN {
            crate::log!(
                "bundle";
                "slow rebuild: {} took {:.1?}",
                spec.label(),
                start.elapsed()
            );
        }

        if self.latest_generation(key) != generation {
            return Ok(None);
        }

        let version = process::write_rendered(&rendered, &self.store)?;
        Ok(Some(version))
    }

    /// Commit a finished rebuild: register the watch and publish the
    /// entry, unless the generation went stale. Returns whether the
    /// entry was installed.
    ///
    /// The generation check and the register+insert pair stay under one
    /// lock so a concurrent `remove` cannot interleave between them and
    /// leave a watch without an entry.
    fn install(
        self: &Arc<Self>,
        key: String,
        spec: BundleSpec,
        generation: u64,
        version: ContentHash,
    ) -> Result<bool, BundleError> {
        let generations = self.generations.lock();

        if generations.get(&key).copied().unwrap_or(0) != generation {
            crate::debug!("bundle"; "discarding superseded rebuild of {key}");
            return Ok(false);
        }

        // Authoritative capacity check: installs serialize on the
        // generation lock, so concurrent adds cannot overshoot the cap.
        if !self.entries.contains_key(&key) && self.entries.len() >= self.limit {
            return Err(BundleError::CapacityReached { limit: self.limit });
        }

        let request = WatchRequest {
            key: key.clone(),
            paths: spec.watch_set(),
        };
        let handle = self.monitor.register(request, self.callback())?;

        self.entries.insert(
            key,
            CacheEntry {
                spec,
                handle,
                generation,
                version,
            },
        );

        drop(generations);
        Ok(true)
    }

    fn callback(self: &Arc<Self>) -> WatchCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |event: WatchEvent| {
            if let Some(cache) = weak.upgrade() {
                cache.on_watch_event(event);
            }
        })
    }
}
