//! Reference markup for bundles.
//!
//! Produces the `<script>`/`<link>` tags a templating layer embeds in
//! its pages. Two modes:
//! - `Bundled`: a single reference to the built artifact, versioned by
//!   its content hash.
//! - `Debug`: one reference per original source, individually hashed,
//!   for development against a server that serves the project root.
//!   Sprites have no per-source form and render bundled in both modes.
//!
//! `RefCache` memoizes rendered markup per output and drops entries
//! through the same watch mechanism the bundle cache uses, so templates
//! pick up new version parameters after a rebuild.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::bundle::BundleSpec;
use crate::error::BundleError;
use crate::hashing::{ContentHash, versioned_url};
use crate::monitor::{PathMonitor, WatchCallback, WatchEvent, WatchRequest};
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefMode {
    Bundled,
    Debug,
}

/// Render reference markup for a bundle, uncached.
pub fn render_markup(
    spec: &BundleSpec,
    mode: RefMode,
    store: &ArtifactStore,
    root: &Path,
) -> Result<String, BundleError> {
    match (spec, mode) {
        (BundleSpec::Script(bundle), RefMode::Bundled) => {
            let hash = hash_file(store, &bundle.output)?;
            Ok(script_tag(&versioned_url(&bundle.url, hash)))
        }
        (BundleSpec::Script(bundle), RefMode::Debug) => {
            let mut markup = String::new();
            for source in &bundle.sources {
                let hash = hash_file(store, &source.path)?;
                markup.push_str(&script_tag(&versioned_url(
                    &root_relative_url(&source.path, root),
                    hash,
                )));
            }
            Ok(markup)
        }
        (BundleSpec::Style(bundle), RefMode::Bundled) => {
            let hash = hash_file(store, &bundle.output)?;
            Ok(style_tag(&versioned_url(&bundle.url, hash)))
        }
        (BundleSpec::Style(bundle), RefMode::Debug) => {
            let mut markup = String::new();
            for source in &bundle.sources {
                let hash = hash_file(store, &source.path)?;
                markup.push_str(&style_tag(&versioned_url(
                    &root_relative_url(&source.path, root),
                    hash,
                )));
            }
            Ok(markup)
        }
        (BundleSpec::Sprite(bundle), _) => {
            let hash = hash_file(store, &bundle.stylesheet)?;
            let url = stylesheet_url(bundle);
            Ok(style_tag(&versioned_url(&url, hash)))
        }
    }
}

/// Watch-invalidated markup cache, keyed by (primary output, mode).
pub struct RefCache {
    monitor: Arc<dyn PathMonitor>,
    store: ArtifactStore,
    root: PathBuf,
    rendered: DashMap<(PathBuf, RefMode), String>,
}

impl RefCache {
    pub fn new(monitor: Arc<dyn PathMonitor>, root: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            monitor,
            store: ArtifactStore::new(),
            root,
            rendered: DashMap::new(),
        })
    }

    /// Rendered markup for a bundle, cached until its files change.
    pub fn markup(self: &Arc<Self>, spec: &BundleSpec, mode: RefMode) -> Result<String, BundleError> {
        let cache_key = (spec.primary_output().to_path_buf(), mode);
        if let Some(hit) = self.rendered.get(&cache_key) {
            return Ok(hit.clone());
        }

        let markup = render_markup(spec, mode, &self.store, &self.root)?;

        // Watch before publish, so a change landing mid-render can only
        // drop an entry that is already current.
        let request = WatchRequest {
            key: format!("refs:{}", spec.primary_output().display()),
            paths: spec.watch_set(),
        };
        self.monitor
            .register(request, self.invalidation(spec.primary_output()))?;

        self.rendered.insert(cache_key, markup.clone());
        Ok(markup)
    }

    /// Any fire — change, eviction, expiry — just drops the memoized
    /// markup; the next render recomputes and re-registers lazily.
    fn invalidation(self: &Arc<Self>, output: &Path) -> WatchCallback {
        let weak = Arc::downgrade(self);
        let output = output.to_path_buf();
        Arc::new(move |_event: WatchEvent| {
            if let Some(cache) = weak.upgrade() {
                cache.rendered.retain(|(path, _), _| *path != output);
            }
        })
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.rendered.len()
    }
}

fn hash_file(store: &ArtifactStore, path: &Path) -> Result<ContentHash, BundleError> {
    Ok(ContentHash::of(&store.read(path)?))
}

fn script_tag(url: &str) -> String {
    format!("<script src=\"{url}\"></script>\n")
}

fn style_tag(url: &str) -> String {
    format!("<link rel=\"stylesheet\" href=\"{url}\">\n")
}

/// Site-absolute URL for a source file under the project root.
fn root_relative_url(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut url = String::from("/");
    url.push_str(&relative.to_string_lossy().replace('\\', "/"));
    url
}

/// The URL a sprite's companion stylesheet is served under: sibling of
/// the image URL, with the stylesheet's file name.
fn stylesheet_url(bundle: &crate::bundle::SpriteBundle) -> String {
    let name = bundle
        .stylesheet
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match bundle.image_url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{name}"),
        None => format!("/{name}"),
    }
}
