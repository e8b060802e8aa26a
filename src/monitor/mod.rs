//! Dependency watching.
//!
//! Binds sets of filesystem paths to cache keys and delivers change,
//! eviction, and expiry notifications asynchronously, off the
//! registering caller's stack.
//!
//! Architecture (production impl):
//! ```text
//! notify → Debouncer (pure timing) → Registry (path → keys) → callbacks
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

// Pure timing and path coalescing.
mod debounce;
// notify-backed monitor with the event pump.
mod fs;
// Registration table and path index.
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use fs::{FsMonitor, MonitorOptions};

/// Why a watch fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchReason {
    /// A monitored path changed on disk; the artifact must be rebuilt.
    Changed,
    /// The monitor dropped the registration under resource pressure.
    Evicted,
    /// The registration aged out of the monitor's TTL.
    Expired,
}

impl WatchReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Evicted => "evicted",
            Self::Expired => "expired",
        }
    }
}

/// Delivered to the registered callback when a watch fires.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: String,
    pub reason: WatchReason,
}

/// A watch registration request: a non-empty path set bound to a key.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub key: String,
    pub paths: Vec<PathBuf>,
}

/// Handle to an active registration.
///
/// The token distinguishes successive registrations under the same key:
/// unregistering with a stale handle is a no-op rather than tearing down
/// a newer registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHandle {
    pub(crate) key: String,
    pub(crate) token: u64,
}

impl WatchHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Callback invoked when a watch fires. Never called on the stack of
/// the thread that registered it.
pub type WatchCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Watch registration errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("watch set for `{0}` is empty")]
    EmptyWatchSet(String),

    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// A path-change monitor.
///
/// Registering under an existing key atomically replaces the prior
/// registration. Path sets are re-issued in full on every registration,
/// never diffed.
pub trait PathMonitor: Send + Sync {
    fn register(
        &self,
        request: WatchRequest,
        callback: WatchCallback,
    ) -> Result<WatchHandle, MonitorError>;

    fn unregister(&self, handle: &WatchHandle);
}
