//! Configuration loading and validation.
//!
//! The `sheaf.toml` manifest declares bundles as `[[script]]`,
//! `[[style]]` and `[[sprite]]` tables. Source paths resolve against
//! the manifest's directory, output paths against `[output] dir`, and
//! public URLs default to the output's location under that directory.

mod error;

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde::Deserialize;
use url::Url;

use crate::bundle::{
    BundleSpec, SourceMode, SpriteBundle, SpriteSource, TextBundle, TextSource,
};
use crate::cache::DEFAULT_MAX_BUNDLES;
use crate::utils::{normalize_path, resolve_against};

pub use error::ConfigError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(skip)]
    root: PathBuf,
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default, rename = "script")]
    pub scripts: Vec<TextBundleSection>,
    #[serde(default, rename = "style")]
    pub styles: Vec<TextBundleSection>,
    #[serde(default, rename = "sprite")]
    pub sprites: Vec<SpriteSection>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Directory bundle outputs are written under (and served from).
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Quiet period after the last file event before rebuilds dispatch.
    pub debounce_ms: u64,
    /// Bundle cache entry limit.
    pub max_bundles: usize,
    /// Watch registration TTL in seconds (off by default).
    pub expire_secs: Option<u64>,
    /// Watch registration limit before the monitor sheds the stalest.
    pub capacity: usize,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_bundles: DEFAULT_MAX_BUNDLES,
            expire_secs: None,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TextBundleSection {
    pub output: PathBuf,
    /// Explicit public URL override (site-absolute path or absolute URL).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sources: Vec<TextSourceSection>,
}

#[derive(Debug, Deserialize)]
pub struct TextSourceSection {
    pub path: String,
    #[serde(default)]
    pub mode: ModeSection,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSection {
    Verbatim,
    #[default]
    Minify,
}

#[derive(Debug, Deserialize)]
pub struct SpriteSection {
    pub image: PathBuf,
    pub stylesheet: PathBuf,
    /// Explicit public URL override for the composed image.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_class_prefix")]
    pub class_prefix: String,
    #[serde(default)]
    pub sources: Vec<SpriteSourceSection>,
}

#[derive(Debug, Deserialize)]
pub struct SpriteSourceSection {
    pub path: String,
    /// CSS class name; defaults to the source's file stem.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_class_prefix() -> String {
    "sprite".to_string()
}

impl Config {
    /// Load configuration from file path with unknown field detection.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (mut config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.config_path = normalize_path(path);
        config.root = config
            .config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        Ok(config)
    }

    /// Parse configuration from a TOML string, rooted at `root`.
    pub fn from_str(content: &str, root: &Path) -> Result<Self, ConfigError> {
        let (mut config, _) = Self::parse_with_ignored(content)?;
        config.root = root.to_path_buf();
        config.config_path = root.join("sheaf.toml");
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        crate::log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        resolve_against(&self.output.dir, &self.root)
    }

    /// Resolve and validate every configured bundle.
    pub fn specs(&self) -> Result<Vec<BundleSpec>, ConfigError> {
        let output_dir = self.output_dir();

        let mut specs = Vec::new();
        for section in &self.scripts {
            specs.push(self.text_spec(section, &output_dir, BundleSpec::Script)?);
        }
        for section in &self.styles {
            specs.push(self.text_spec(section, &output_dir, BundleSpec::Style)?);
        }
        for section in &self.sprites {
            specs.push(self.sprite_spec(section, &output_dir)?);
        }

        // Exactly one entry per cache key.
        let mut seen = FxHashSet::default();
        for spec in &specs {
            if !seen.insert(spec.cache_key()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate bundle output `{}`",
                    spec.primary_output().display()
                )));
            }
        }

        Ok(specs)
    }

    fn text_spec(
        &self,
        section: &TextBundleSection,
        output_dir: &Path,
        build: fn(TextBundle) -> BundleSpec,
    ) -> Result<BundleSpec, ConfigError> {
        let output = resolve_against(&section.output, output_dir);
        let url = resolve_url(section.url.as_deref(), &output, output_dir)?;

        let sources = section
            .sources
            .iter()
            .map(|source| TextSource {
                path: self.source_path(&source.path),
                mode: match source.mode {
                    ModeSection::Verbatim => SourceMode::Verbatim,
                    ModeSection::Minify => SourceMode::Minify,
                },
            })
            .collect();

        Ok(build(TextBundle {
            output,
            url,
            sources,
        }))
    }

    fn sprite_spec(
        &self,
        section: &SpriteSection,
        output_dir: &Path,
    ) -> Result<BundleSpec, ConfigError> {
        let image = resolve_against(&section.image, output_dir);
        let stylesheet = resolve_against(&section.stylesheet, output_dir);
        let image_url = resolve_url(section.url.as_deref(), &image, output_dir)?;

        let sources = section
            .sources
            .iter()
            .map(|source| {
                let path = self.source_path(&source.path);
                let name = source.name.clone().unwrap_or_else(|| {
                    path.file_stem()
                        .map_or_else(|| "element".to_string(), |n| n.to_string_lossy().into_owned())
                });
                SpriteSource { path, name }
            })
            .collect();

        Ok(BundleSpec::Sprite(SpriteBundle {
            image,
            stylesheet,
            image_url,
            class_prefix: section.class_prefix.clone(),
            sources,
        }))
    }

    /// Expand `~` and resolve a source path against the manifest root.
    fn source_path(&self, raw: &str) -> PathBuf {
        let expanded = shellexpand::tilde(raw);
        resolve_against(Path::new(expanded.as_ref()), &self.root)
    }
}

/// Explicit URLs must be site-absolute paths or absolute URLs; without
/// one, the URL mirrors the output's location under the output dir.
fn resolve_url(
    explicit: Option<&str>,
    output: &Path,
    output_dir: &Path,
) -> Result<String, ConfigError> {
    if let Some(url) = explicit {
        if url.starts_with('/') {
            return Ok(url.to_string());
        }
        return match Url::parse(url) {
            Ok(parsed) => Ok(parsed.to_string()),
            Err(_) => Err(ConfigError::Validation(format!(
                "malformed url `{url}` (expected a site-absolute path or absolute URL)"
            ))),
        };
    }

    let relative = output.strip_prefix(output_dir).map_err(|_| {
        ConfigError::Validation(format!(
            "output `{}` is outside the output directory; set `url` explicitly",
            output.display()
        ))
    })?;

    Ok(format!(
        "/{}",
        relative.to_string_lossy().replace('\\', "/")
    ))
}
