//! Artifact persistence with bounded-retry file I/O.
//!
//! Reads can race editors holding a file mid-save and writes can race
//! scanners holding the output; both are retried a fixed number of times
//! before surfacing an error. Writes return the blake3 hash of the
//! written content so callers get the artifact version for free.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BundleError;
use crate::hashing::ContentHash;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Retrying file reader/writer for sources and outputs.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactStore {
    attempts: u32,
    backoff: Duration,
}

impl ArtifactStore {
    pub const fn new() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS,
            backoff: RETRY_BACKOFF,
        }
    }

    /// Read a file fully, retrying on transient failures.
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, BundleError> {
        self.with_retries(path, |p| fs::read(p))
            .map_err(|source| BundleError::Read {
                path: path.to_path_buf(),
                attempts: self.attempts,
                source,
            })
    }

    /// Read a file as UTF-8 text, retrying on transient failures.
    pub fn read_to_string(&self, path: &Path) -> Result<String, BundleError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| {
            BundleError::Invalid(format!("`{}` is not valid UTF-8", path.display()))
        })
    }

    /// Write content to a path, creating parent directories as needed.
    ///
    /// Returns the blake3 hash of the written bytes.
    pub fn write(&self, path: &Path, content: &[u8]) -> Result<ContentHash, BundleError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| BundleError::Write {
                path: path.to_path_buf(),
                attempts: 1,
                source,
            })?;
        }

        self.with_retries(path, |p| fs::write(p, content))
            .map_err(|source| BundleError::Write {
                path: path.to_path_buf(),
                attempts: self.attempts,
                source,
            })?;

        Ok(ContentHash::of(content))
    }

    /// Write content only when it differs from what is on disk.
    ///
    /// The output path is part of its own watch set; skipping identical
    /// writes keeps a rebuild from re-triggering itself through the
    /// output watch.
    pub fn write_if_changed(&self, path: &Path, content: &[u8]) -> Result<ContentHash, BundleError> {
        if let Ok(existing) = fs::read(path)
            && existing == content
        {
            return Ok(ContentHash::of(content));
        }

        self.write(path, content)
    }

    fn with_retries<T>(
        &self,
        path: &Path,
        op: impl Fn(&PathBuf) -> io::Result<T>,
    ) -> io::Result<T> {
        let path = path.to_path_buf();
        let mut last_err = None;

        for attempt in 0..self.attempts {
            match op(&path) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_err = Some(err);
                    if attempt + 1 < self.attempts {
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| io::Error::other("retry loop without attempts")))
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/app.js");
        let store = ArtifactStore::new();

        let hash = store.write(&path, b"console.log(1)").unwrap();
        assert_eq!(hash, ContentHash::of(b"console.log(1)"));
        assert_eq!(store.read(&path).unwrap(), b"console.log(1)");
    }

    #[test]
    fn test_read_missing_exhausts_retries() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new();

        let err = store.read(&dir.path().join("missing.js")).unwrap_err();
        match err {
            BundleError::Read { attempts, .. } => assert_eq!(attempts, RETRY_ATTEMPTS),
            other => panic!("expected Read error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_to_string_rejects_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.js");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = ArtifactStore::new().read_to_string(&path).unwrap_err();
        assert!(matches!(err, BundleError::Invalid(_)));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/style.css");

        ArtifactStore::new().write(&path, b"body{}").unwrap();
        assert!(path.exists());
    }
}
