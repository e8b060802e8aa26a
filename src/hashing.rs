//! Content hashing for cache busting.
//!
//! Every written artifact gets a blake3 content hash; its short hex form
//! becomes the `?v=` query parameter on URLs referencing the artifact, so
//! a changed artifact forces a browser re-fetch.

use std::fmt;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a byte buffer.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Convert to full hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Short version string (first 8 hex chars) used as the `?v=` value.
    pub fn version(self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display first 16 chars of hex for brevity
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Append a cache-busting version parameter to a URL.
///
/// Returns `base_url?v=abc12345` format.
pub fn versioned_url(base_url: &str, hash: ContentHash) -> String {
    format!("{}?v={}", base_url, hash.version())
}
