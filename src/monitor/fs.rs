//! notify-backed path monitor.
//!
//! Implements the "Watcher-First" pattern: the OS watcher starts as soon
//! as the monitor is spawned and buffers events while callers perform
//! their initial builds, so no change is lost between build and watch.

use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::debounce::Debouncer;
use super::registry::{DirChanges, Registry};
use super::{
    MonitorError, PathMonitor, WatchCallback, WatchEvent, WatchHandle, WatchReason, WatchRequest,
};
use crate::utils::normalize_path;

/// Warn when a dispatched rebuild is still running after this long.
const SLOW_DISPATCH_WARN: Duration = Duration::from_secs(10);
/// Tick interval for the TTL sweep when expiry is enabled.
const EXPIRY_TICK: Duration = Duration::from_secs(1);

/// Tuning for [`FsMonitor::spawn`].
#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    /// Quiet period after the last raw event before dispatch.
    pub debounce: Duration,
    /// Registration limit; beyond it the stalest registration is
    /// evicted with an `Evicted` callback.
    pub capacity: usize,
    /// Optional registration TTL; aged-out registrations are dropped
    /// with an `Expired` callback.
    pub expire_after: Option<Duration>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            capacity: 1024,
            expire_after: None,
        }
    }
}

/// Path monitor backed by a notify watcher and a tokio event pump.
pub struct FsMonitor {
    registry: Registry,
    watcher: Mutex<RecommendedWatcher>,
    expire_after: Option<Duration>,
}

impl FsMonitor {
    /// Create the watcher and start the event pump.
    ///
    /// Must be called from within a tokio runtime; the pump runs as a
    /// task on it.
    pub fn spawn(options: MonitorOptions) -> Result<Arc<Self>, MonitorError> {
        // Sync channel for notify (it doesn't support async)
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let monitor = Arc::new(Self {
            registry: Registry::new(options.capacity),
            watcher: Mutex::new(watcher),
            expire_after: options.expire_after,
        });

        let (async_tx, async_rx) = mpsc::channel::<notify::Event>(64);

        // Bridge thread: poll notify events and forward to the pump
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        tokio::spawn(pump(Arc::downgrade(&monitor), async_rx, options.debounce));

        Ok(monitor)
    }

    /// Apply directory-watch changes computed by the registry.
    fn apply_dirs(&self, dirs: DirChanges) {
        let mut watcher = self.watcher.lock();

        for dir in dirs.unwatch {
            if let Err(e) = watcher.unwatch(&dir) {
                crate::debug!("watch"; "unwatch {} failed: {}", dir.display(), e);
            }
        }

        for dir in dirs.watch {
            // A directory that cannot be attached only mutes its own
            // events; the registration itself stays valid.
            if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                crate::log!("watch"; "cannot watch {}: {}", dir.display(), e);
            }
        }
    }
}

impl PathMonitor for FsMonitor {
    fn register(
        &self,
        request: WatchRequest,
        callback: WatchCallback,
    ) -> Result<WatchHandle, MonitorError> {
        // Registered paths must match normalized event paths exactly.
        let request = WatchRequest {
            key: request.key,
            paths: request.paths.iter().map(|p| normalize_path(p)).collect(),
        };

        let outcome = self.registry.register(request, callback)?;
        self.apply_dirs(outcome.dirs);

        if let Some((key, callback)) = outcome.evicted {
            deliver_detached(key, callback, WatchReason::Evicted);
        }

        Ok(outcome.handle)
    }

    fn unregister(&self, handle: &WatchHandle) {
        let dirs = self.registry.unregister(handle);
        self.apply_dirs(dirs);
    }
}

/// Deliver a callback on its own thread, off the caller's stack.
fn deliver_detached(key: String, callback: WatchCallback, reason: WatchReason) {
    std::thread::spawn(move || callback(WatchEvent { key, reason }));
}

/// Dispatch a Changed callback on a blocking task with a watchdog that
/// surfaces slow rebuilds as a warning instead of stalling the pump.
fn dispatch_changed(key: String, callback: WatchCallback) {
    let event = WatchEvent {
        key: key.clone(),
        reason: WatchReason::Changed,
    };
    let task = tokio::task::spawn_blocking(move || callback(event));

    tokio::spawn(async move {
        if tokio::time::timeout(SLOW_DISPATCH_WARN, task).await.is_err() {
            crate::log!(
                "watch";
                "rebuild of {} still running after {}s",
                key,
                SLOW_DISPATCH_WARN.as_secs()
            );
        }
    });
}

/// Monitor event pump: debounce raw events, map changed paths to
/// registrations, sweep expired registrations.
async fn pump(monitor: Weak<FsMonitor>, mut events: mpsc::Receiver<notify::Event>, debounce: Duration) {
    let mut debouncer = Debouncer::new(debounce);
    let has_ttl = monitor.upgrade().is_some_and(|m| m.expire_after.is_some());

    loop {
        let mut sleep = debouncer.sleep_duration();
        if has_ttl {
            sleep = sleep.min(EXPIRY_TICK);
        }

        tokio::select! {
            biased;
            event = events.recv() => {
                match event {
                    Some(event) => debouncer.add_event(&event),
                    None => break, // watcher dropped
                }
            }
            _ = tokio::time::sleep(sleep) => {
                let Some(monitor) = monitor.upgrade() else { break };

                if let Some(ttl) = monitor.expire_after {
                    let (expired, dirs) = monitor.registry.sweep_expired(ttl);
                    monitor.apply_dirs(dirs);
                    for (key, callback) in expired {
                        crate::debug!("watch"; "registration for {} expired", key);
                        deliver_detached(key, callback, WatchReason::Expired);
                    }
                }

                if let Some(changed) = debouncer.take_if_ready() {
                    for (key, callback) in monitor.registry.affected(&changed) {
                        crate::debug!("watch"; "dispatch changed: {}", key);
                        dispatch_changed(key, callback);
                    }
                }
            }
        }
    }
}
