//! Watch registration table.
//!
//! Maps cache keys to their path sets and callbacks, and changed paths
//! back to the keys watching them. Also owns parent-directory refcounts
//! so the watcher only holds one OS handle per directory regardless of
//! how many registrations share it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{MonitorError, WatchCallback, WatchHandle, WatchRequest};

pub(super) struct Registration {
    token: u64,
    paths: Vec<PathBuf>,
    pub(super) callback: WatchCallback,
    registered_at: Instant,
}

/// Directory-watch adjustments the caller must apply to the OS watcher.
#[derive(Default, Debug)]
pub(super) struct DirChanges {
    pub(super) watch: Vec<PathBuf>,
    pub(super) unwatch: Vec<PathBuf>,
}

pub(super) struct RegisterOutcome {
    pub(super) handle: WatchHandle,
    pub(super) dirs: DirChanges,
    /// Registration dropped to make room; owed an `Evicted` callback.
    pub(super) evicted: Option<(String, WatchCallback)>,
}

impl std::fmt::Debug for RegisterOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterOutcome")
            .field("handle", &self.handle)
            .field("dirs", &self.dirs)
            .field("evicted", &self.evicted.as_ref().map(|(k, _)| k))
            .finish()
    }
}

pub(super) struct Registry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

#[derive(Default)]
struct RegistryInner {
    registrations: FxHashMap<String, Registration>,
    by_path: FxHashMap<PathBuf, FxHashSet<String>>,
    dir_refs: FxHashMap<PathBuf, usize>,
    next_token: u64,
}

impl Registry {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Register a path set under a key, replacing any prior registration
    /// for that key. At capacity, the stalest registration is evicted to
    /// make room and returned so the caller can deliver `Evicted`.
    pub(super) fn register(
        &self,
        request: WatchRequest,
        callback: WatchCallback,
    ) -> Result<RegisterOutcome, MonitorError> {
        if request.paths.is_empty() {
            return Err(MonitorError::EmptyWatchSet(request.key));
        }

        let mut inner = self.inner.lock();
        let mut dirs = DirChanges::default();
        let mut evicted = None;

        if inner.registrations.contains_key(&request.key) {
            inner.drop_registration(&request.key, &mut dirs);
        } else if inner.registrations.len() >= self.capacity
            && let Some(stalest) = inner.stalest_key()
            && let Some(registration) = inner.drop_registration(&stalest, &mut dirs)
        {
            evicted = Some((stalest, registration.callback));
        }

        inner.next_token += 1;
        let token = inner.next_token;

        for path in &request.paths {
            inner
                .by_path
                .entry(path.clone())
                .or_default()
                .insert(request.key.clone());

            let dir = parent_dir(path);
            let refs = inner.dir_refs.entry(dir.clone()).or_insert(0);
            *refs += 1;
            if *refs == 1 {
                dirs.watch.push(dir);
            }
        }

        inner.registrations.insert(
            request.key.clone(),
            Registration {
                token,
                paths: request.paths,
                callback,
                registered_at: Instant::now(),
            },
        );

        Ok(RegisterOutcome {
            handle: WatchHandle {
                key: request.key,
                token,
            },
            dirs,
            evicted,
        })
    }

    /// Drop a registration if the handle still owns it.
    pub(super) fn unregister(&self, handle: &WatchHandle) -> DirChanges {
        let mut inner = self.inner.lock();
        let mut dirs = DirChanges::default();

        let current = inner
            .registrations
            .get(&handle.key)
            .is_some_and(|r| r.token == handle.token);
        if current {
            inner.drop_registration(&handle.key, &mut dirs);
        }

        dirs
    }

    /// Keys watching any of the changed paths, with their callbacks.
    pub(super) fn affected(
        &self,
        changed: &FxHashSet<PathBuf>,
    ) -> Vec<(String, WatchCallback)> {
        let inner = self.inner.lock();
        let mut keys = FxHashSet::default();

        for path in changed {
            if let Some(watchers) = inner.by_path.get(path) {
                keys.extend(watchers.iter().cloned());
            }
        }

        let mut affected: Vec<_> = keys
            .into_iter()
            .filter_map(|key| {
                let registration = inner.registrations.get(&key)?;
                Some((key, registration.callback.clone()))
            })
            .collect();
        // Deterministic dispatch order.
        affected.sort_by(|a, b| a.0.cmp(&b.0));
        affected
    }

    /// Drop registrations older than `ttl`; owed `Expired` callbacks.
    pub(super) fn sweep_expired(
        &self,
        ttl: Duration,
    ) -> (Vec<(String, WatchCallback)>, DirChanges) {
        let mut inner = self.inner.lock();
        let mut dirs = DirChanges::default();

        let mut expired_keys: Vec<String> = inner
            .registrations
            .iter()
            .filter(|(_, r)| r.registered_at.elapsed() >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        expired_keys.sort();

        let mut expired = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some(registration) = inner.drop_registration(&key, &mut dirs) {
                expired.push((key, registration.callback));
            }
        }

        (expired, dirs)
    }

    pub(super) fn len(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    #[cfg(test)]
    pub(super) fn paths_of(&self, key: &str) -> Option<Vec<PathBuf>> {
        self.inner
            .lock()
            .registrations
            .get(key)
            .map(|r| r.paths.clone())
    }
}

impl RegistryInner {
    /// Remove a registration and release its path index and directory
    /// refcounts, recording directories that dropped to zero.
    fn drop_registration(&mut self, key: &str, dirs: &mut DirChanges) -> Option<Registration> {
        let registration = self.registrations.remove(key)?;

        for path in &registration.paths {
            if let Some(watchers) = self.by_path.get_mut(path) {
                watchers.remove(key);
                if watchers.is_empty() {
                    self.by_path.remove(path);
                }
            }

            let dir = parent_dir(path);
            if let Some(refs) = self.dir_refs.get_mut(&dir) {
                *refs -= 1;
                if *refs == 0 {
                    self.dir_refs.remove(&dir);
                    dirs.unwatch.push(dir);
                }
            }
        }

        Some(registration)
    }

    fn stalest_key(&self) -> Option<String> {
        self.registrations
            .iter()
            .min_by_key(|(_, r)| r.registered_at)
            .map(|(key, _)| key.clone())
    }
}

/// The directory the OS watcher must hold to see events for a path.
fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| path.to_path_buf(), Path::to_path_buf)
}
