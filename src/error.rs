//! Error types for bundle building and cache orchestration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::monitor::MonitorError;

/// Errors surfaced by bundle rendering and the bundle cache.
#[derive(Debug, Error)]
pub enum BundleError {
    /// No configured bundle produces the requested output.
    #[error("unknown bundle output `{0}`")]
    UnknownBundle(String),

    /// Reading a source or output failed after bounded retries.
    #[error("reading `{path}` failed after {attempts} attempts")]
    Read {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Writing an output failed after bounded retries.
    #[error("writing `{path}` failed after {attempts} attempts")]
    Write {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Input the processor cannot work with (empty sprite set,
    /// undecodable image, non-UTF-8 text source).
    #[error("{0}")]
    Invalid(String),

    /// The cache refused a new entry because the bundle limit is reached.
    #[error("bundle cache is full ({limit} entries)")]
    CapacityReached { limit: usize },

    /// Watch registration failed.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

impl BundleError {
    /// True for errors caused by file I/O (as opposed to bad input).
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Write { .. })
    }
}
