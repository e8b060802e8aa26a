//! In-memory monitor for deterministic tests.
//!
//! Callbacks run synchronously on the firing thread so tests can assert
//! the cache state immediately after `fire` returns.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{
    MonitorError, PathMonitor, WatchCallback, WatchEvent, WatchHandle, WatchReason, WatchRequest,
};

struct MockRegistration {
    token: u64,
    paths: Vec<PathBuf>,
    callback: WatchCallback,
}

#[derive(Default)]
pub(crate) struct MockMonitor {
    registrations: Mutex<FxHashMap<String, MockRegistration>>,
    next_token: AtomicU64,
}

impl MockMonitor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fire a reason at a key; returns whether a registration existed.
    ///
    /// Evicted/Expired drop the registration before the callback runs,
    /// like a host monitor shedding entries under pressure or TTL.
    pub(crate) fn fire(&self, key: &str, reason: WatchReason) -> bool {
        let callback = {
            let mut registrations = self.registrations.lock();
            match reason {
                WatchReason::Changed => registrations.get(key).map(|r| r.callback.clone()),
                WatchReason::Evicted | WatchReason::Expired => {
                    registrations.remove(key).map(|r| r.callback)
                }
            }
        };

        let Some(callback) = callback else {
            return false;
        };
        callback(WatchEvent {
            key: key.to_string(),
            reason,
        });
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub(crate) fn paths_of(&self, key: &str) -> Option<Vec<PathBuf>> {
        self.registrations.lock().get(key).map(|r| r.paths.clone())
    }

    pub(crate) fn token_of(&self, key: &str) -> Option<u64> {
        self.registrations.lock().get(key).map(|r| r.token)
    }
}

impl PathMonitor for MockMonitor {
    fn register(
        &self,
        request: WatchRequest,
        callback: WatchCallback,
    ) -> Result<WatchHandle, MonitorError> {
        if request.paths.is_empty() {
            return Err(MonitorError::EmptyWatchSet(request.key));
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.registrations.lock().insert(
            request.key.clone(),
            MockRegistration {
                token,
                paths: request.paths,
                callback,
            },
        );

        Ok(WatchHandle {
            key: request.key,
            token,
        })
    }

    fn unregister(&self, handle: &WatchHandle) {
        let mut registrations = self.registrations.lock();
        if registrations
            .get(&handle.key)
            .is_some_and(|r| r.token == handle.token)
        {
            registrations.remove(&handle.key);
        }
    }
}
