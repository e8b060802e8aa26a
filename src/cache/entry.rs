use crate::bundle::BundleSpec;
use crate::hashing::ContentHash;
use crate::monitor::WatchHandle;

/// One live bundle in the cache.
///
/// Entries are replaced wholesale — by a finished regeneration or a
/// cheap re-registration — never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub spec: BundleSpec,
    pub handle: WatchHandle,
    /// The generation that produced this entry.
    pub generation: u64,
    /// Content hash of the primary output at install time.
    pub version: ContentHash,
}
