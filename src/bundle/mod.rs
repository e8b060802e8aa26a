//! Bundle descriptors.
//!
//! A `BundleSpec` describes one derived artifact: its ordered sources,
//! output location(s), and the public URL the artifact is served under.
//! Source order is semantically significant and preserved end-to-end —
//! it decides concatenation order for text bundles and stacking order
//! for sprites.

use std::path::{Path, PathBuf};

/// Artifact kind, selecting the content processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Script,
    Style,
    Sprite,
}

impl BundleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::Sprite => "sprite",
        }
    }
}

/// How a text source contributes to its bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Copied into the output as-is.
    Verbatim,
    /// Joined with the other minify-class sources and minified as one unit.
    Minify,
}

/// One source file of a script or style bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSource {
    pub path: PathBuf,
    pub mode: SourceMode,
}

/// One source image of a sprite bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSource {
    pub path: PathBuf,
    /// Display name used in the generated CSS class.
    pub name: String,
}

/// A script or style bundle: ordered sources concatenated into one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBundle {
    pub output: PathBuf,
    /// Site-absolute path or absolute URL the output is served under.
    pub url: String,
    pub sources: Vec<TextSource>,
}

/// A sprite bundle: source images stacked into one sheet plus a
/// companion stylesheet describing per-element geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteBundle {
    pub image: PathBuf,
    pub stylesheet: PathBuf,
    /// URL the composed image is served under (referenced from the CSS).
    pub image_url: String,
    /// CSS class prefix, `{prefix}-{element name}`.
    pub class_prefix: String,
    pub sources: Vec<SpriteSource>,
}

/// Descriptor of one derived artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSpec {
    Script(TextBundle),
    Style(TextBundle),
    Sprite(SpriteBundle),
}

impl BundleSpec {
    pub fn kind(&self) -> BundleKind {
        match self {
            Self::Script(_) => BundleKind::Script,
            Self::Style(_) => BundleKind::Style,
            Self::Sprite(_) => BundleKind::Sprite,
        }
    }

    /// Deterministic cache key: kind + all location identifiers.
    ///
    /// Composite kinds include every output location, so two sprites
    /// sharing an image but not a stylesheet never collide.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Script(t) => format!("script:{}", t.output.display()),
            Self::Style(t) => format!("style:{}", t.output.display()),
            Self::Sprite(s) => format!(
                "sprite:{}:{}",
                s.image.display(),
                s.stylesheet.display()
            ),
        }
    }

    /// The output whose content hash is the bundle's version.
    pub fn primary_output(&self) -> &Path {
        match self {
            Self::Script(t) | Self::Style(t) => &t.output,
            Self::Sprite(s) => &s.image,
        }
    }

    pub fn output_paths(&self) -> Vec<&Path> {
        match self {
            Self::Script(t) | Self::Style(t) => vec![&t.output],
            Self::Sprite(s) => vec![&s.image, &s.stylesheet],
        }
    }

    pub fn source_paths(&self) -> Vec<&Path> {
        match self {
            Self::Script(t) | Self::Style(t) => {
                t.sources.iter().map(|s| s.path.as_path()).collect()
            }
            Self::Sprite(s) => s.sources.iter().map(|s| s.path.as_path()).collect(),
        }
    }

    /// The full monitored path set: output path(s) plus every source.
    ///
    /// The outputs are always included so a direct external edit of the
    /// derived artifact is healed like any source change. Re-issued in
    /// full on every (re)registration, never diffed.
    pub fn watch_set(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .output_paths()
            .into_iter()
            .map(Path::to_path_buf)
            .collect();
        paths.extend(self.source_paths().into_iter().map(Path::to_path_buf));
        paths
    }

    /// Short display label for logs.
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.kind().label(),
            self.primary_output().display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(output: &str) -> BundleSpec {
        BundleSpec::Script(TextBundle {
            output: PathBuf::from(output),
            url: format!("/{output}"),
            sources: vec![
                TextSource {
                    path: PathBuf::from("/src/a.js"),
                    mode: SourceMode::Verbatim,
                },
                TextSource {
                    path: PathBuf::from("/src/b.js"),
                    mode: SourceMode::Minify,
                },
            ],
        })
    }

    #[test]
    fn test_cache_key_includes_kind_and_outputs() {
        let spec = script("public/js/app.js");
        assert_eq!(spec.cache_key(), "script:public/js/app.js");

        let sprite = BundleSpec::Sprite(SpriteBundle {
            image: PathBuf::from("public/img/icons.png"),
            stylesheet: PathBuf::from("public/css/icons.css"),
            image_url: "/img/icons.png".into(),
            class_prefix: "sprite".into(),
            sources: vec![],
        });
        assert_eq!(
            sprite.cache_key(),
            "sprite:public/img/icons.png:public/css/icons.css"
        );
    }

    #[test]
    fn test_cache_key_deterministic() {
        assert_eq!(script("a.js").cache_key(), script("a.js").cache_key());
        assert_ne!(script("a.js").cache_key(), script("b.js").cache_key());
    }

    #[test]
    fn test_watch_set_outputs_first_then_sources() {
        let spec = script("public/js/app.js");
        let watch = spec.watch_set();
        assert_eq!(watch.len(), 3);
        assert_eq!(watch[0], PathBuf::from("public/js/app.js"));
        assert_eq!(watch[1], PathBuf::from("/src/a.js"));
        assert_eq!(watch[2], PathBuf::from("/src/b.js"));
    }

    #[test]
    fn test_sprite_outputs_include_both_locations() {
        let sprite = BundleSpec::Sprite(SpriteBundle {
            image: PathBuf::from("img.png"),
            stylesheet: PathBuf::from("icons.css"),
            image_url: "/img.png".into(),
            class_prefix: "sprite".into(),
            sources: vec![SpriteSource {
                path: PathBuf::from("/icons/home.png"),
                name: "home".into(),
            }],
        });
        assert_eq!(sprite.output_paths().len(), 2);
        assert_eq!(sprite.watch_set().len(), 3);
    }
}
