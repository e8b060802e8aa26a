//! Content processing.
//!
//! Turns a bundle's ordered source contents into final output bytes.
//! One processor per artifact kind, selected through [`BundleKind`];
//! the processors are pure — same spec and source bytes always produce
//! byte-identical outputs.

mod sprite;
mod text;

use std::path::PathBuf;

use crate::bundle::{BundleKind, BundleSpec};
use crate::error::BundleError;
use crate::hashing::ContentHash;
use crate::store::ArtifactStore;

pub use sprite::SPRITE_PADDING;

/// One source file's contents, loaded in spec order.
pub struct LoadedSource {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Processor output: one or more files to persist, primary first.
#[derive(Debug)]
pub struct Rendered {
    pub files: Vec<(PathBuf, Vec<u8>)>,
}

/// Turns ordered source contents into final output bytes.
pub trait ContentProcessor: Send + Sync {
    fn process(
        &self,
        spec: &BundleSpec,
        sources: &[LoadedSource],
    ) -> Result<Rendered, BundleError>;
}

pub fn processor_for(kind: BundleKind) -> &'static dyn ContentProcessor {
    match kind {
        BundleKind::Script => &text::ScriptProcessor,
        BundleKind::Style => &text::StyleProcessor,
        BundleKind::Sprite => &sprite::SpriteProcessor,
    }
}

/// Load a spec's sources in order and run its processor.
pub fn render(spec: &BundleSpec, store: &ArtifactStore) -> Result<Rendered, BundleError> {
    let mut sources = Vec::new();
    for path in spec.source_paths() {
        sources.push(LoadedSource {
            path: path.to_path_buf(),
            bytes: store.read(path)?,
        });
    }

    processor_for(spec.kind()).process(spec, &sources)
}

/// Persist rendered files; returns the primary output's content hash.
///
/// Byte-identical outputs are skipped so a rebuild of unchanged content
/// does not re-trigger the watch on its own output.
pub fn write_rendered(rendered: &Rendered, store: &ArtifactStore) -> Result<ContentHash, BundleError> {
    let mut version = None;
    for (path, bytes) in &rendered.files {
        let hash = store.write_if_changed(path, bytes)?;
        version.get_or_insert(hash);
    }
    Ok(version.unwrap_or(ContentHash::of(&[])))
}
