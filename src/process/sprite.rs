//! Sprite composition.
//!
//! Source images are stacked vertically in input order with a fixed
//! inter-image padding. The companion stylesheet carries one rule per
//! element whose background offset is the cumulative height (including
//! padding) of everything above it, plus a content-hash `?v=` parameter
//! on the image reference so browsers re-fetch a recomposed sheet.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage, imageops};

use super::{ContentProcessor, LoadedSource, Rendered};
use crate::bundle::{BundleSpec, SpriteBundle};
use crate::error::BundleError;
use crate::hashing::{ContentHash, versioned_url};

/// Vertical gap between stacked elements, in pixels.
pub const SPRITE_PADDING: u32 = 2;

pub(super) struct SpriteProcessor;

/// Decoded element, alive for one composition pass.
struct SpriteElement {
    name: String,
    width: u32,
    height: u32,
    pixels: RgbaImage,
}

impl ContentProcessor for SpriteProcessor {
    fn process(
        &self,
        spec: &BundleSpec,
        sources: &[LoadedSource],
    ) -> Result<Rendered, BundleError> {
        let BundleSpec::Sprite(bundle) = spec else {
            return Err(BundleError::Invalid(
                "sprite processor needs a sprite bundle".into(),
            ));
        };

        // Canvas width is max() over sources, undefined for an empty set.
        if bundle.sources.is_empty() {
            return Err(BundleError::Invalid(format!(
                "sprite bundle `{}` has no sources",
                bundle.image.display()
            )));
        }

        let mut elements = Vec::with_capacity(sources.len());
        for (source, loaded) in bundle.sources.iter().zip(sources) {
            let decoded = image::load_from_memory(&loaded.bytes).map_err(|e| {
                BundleError::Invalid(format!(
                    "decoding `{}` failed: {e}",
                    loaded.path.display()
                ))
            })?;
            let pixels = decoded.to_rgba8();
            elements.push(SpriteElement {
                name: source.name.clone(),
                width: pixels.width(),
                height: pixels.height(),
                pixels,
            });
        }

        let sheet = compose(&elements);
        let png = encode_png(sheet)?;
        let hash = ContentHash::of(&png);
        let stylesheet = stylesheet(bundle, &elements, hash);

        Ok(Rendered {
            files: vec![
                (bundle.image.clone(), png),
                (bundle.stylesheet.clone(), stylesheet.into_bytes()),
            ],
        })
    }
}

/// Stack elements top to bottom in input order.
///
/// Canvas height includes the padding after every element, the last one
/// included.
fn compose(elements: &[SpriteElement]) -> RgbaImage {
    let width = elements.iter().map(|e| e.width).max().unwrap_or(0);
    let height: u32 = elements.iter().map(|e| e.height + SPRITE_PADDING).sum();

    let mut canvas = RgbaImage::new(width, height);
    let mut y = 0u32;
    for element in elements {
        imageops::replace(&mut canvas, &element.pixels, 0, i64::from(y));
        y += element.height + SPRITE_PADDING;
    }

    canvas
}

fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>, BundleError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| BundleError::Invalid(format!("encoding sprite sheet failed: {e}")))?;
    Ok(buf)
}

/// One rule per element, offset by the cumulative height above it.
fn stylesheet(bundle: &SpriteBundle, elements: &[SpriteElement], hash: ContentHash) -> String {
    let url = versioned_url(&bundle.image_url, hash);
    let mut css = String::new();

    let mut offset = 0u32;
    for element in elements {
        let position = if offset == 0 {
            "0 0".to_string()
        } else {
            format!("0 -{offset}px")
        };
        css.push_str(&format!(
            ".{prefix}-{name}{{background-image:url(\"{url}\");background-position:{position};width:{width}px;height:{height}px}}\n",
            prefix = bundle.class_prefix,
            name = element.name,
            width = element.width,
            height = element.height,
        ));
        offset += element.height + SPRITE_PADDING;
    }

    css
}
