//! Script and style bundling.
//!
//! Sources are partitioned into verbatim and minify classes, keeping the
//! original relative order within each class. Verbatim sources are
//! concatenated first; the minify class is concatenated and minified as
//! ONE unit (cross-file minification, so the minifier can drop symbols
//! across source boundaries), then appended after the verbatim block.

use std::str;

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::{ContentProcessor, LoadedSource, Rendered};
use crate::bundle::{BundleSpec, SourceMode, TextBundle};
use crate::error::BundleError;

pub(super) struct ScriptProcessor;
pub(super) struct StyleProcessor;

impl ContentProcessor for ScriptProcessor {
    fn process(
        &self,
        spec: &BundleSpec,
        sources: &[LoadedSource],
    ) -> Result<Rendered, BundleError> {
        let BundleSpec::Script(bundle) = spec else {
            return Err(BundleError::Invalid(
                "script processor needs a script bundle".into(),
            ));
        };

        let output = combine(bundle, sources, minify_js)?;
        Ok(Rendered {
            files: vec![(bundle.output.clone(), output.into_bytes())],
        })
    }
}

impl ContentProcessor for StyleProcessor {
    fn process(
        &self,
        spec: &BundleSpec,
        sources: &[LoadedSource],
    ) -> Result<Rendered, BundleError> {
        let BundleSpec::Style(bundle) = spec else {
            return Err(BundleError::Invalid(
                "style processor needs a style bundle".into(),
            ));
        };

        let output = combine(bundle, sources, minify_css)?;
        Ok(Rendered {
            files: vec![(bundle.output.clone(), output.into_bytes())],
        })
    }
}

/// Partition, concatenate, minify.
///
/// An empty source list is a valid no-op and yields empty output.
fn combine(
    bundle: &TextBundle,
    sources: &[LoadedSource],
    minify: fn(&str) -> Option<String>,
) -> Result<String, BundleError> {
    let mut verbatim = String::new();
    let mut minifiable = String::new();

    for (source, loaded) in bundle.sources.iter().zip(sources) {
        let text = str::from_utf8(&loaded.bytes).map_err(|_| {
            BundleError::Invalid(format!("`{}` is not valid UTF-8", loaded.path.display()))
        })?;

        let class = match source.mode {
            SourceMode::Verbatim => &mut verbatim,
            SourceMode::Minify => &mut minifiable,
        };
        class.push_str(text);
        if !text.ends_with('\n') {
            class.push('\n');
        }
    }

    let mut output = verbatim;
    if !minifiable.is_empty() {
        match minify(&minifiable) {
            Some(minified) => output.push_str(&minified),
            None => {
                crate::log!(
                    "bundle";
                    "minification failed for {}, emitting unminified",
                    bundle.output.display()
                );
                output.push_str(&minifiable);
            }
        }
    }

    Ok(output)
}

/// Minify JavaScript source code.
pub(crate) fn minify_js(source: &str) -> Option<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::mjs();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Some(code)
}

/// Minify CSS source code.
pub(crate) fn minify_css(source: &str) -> Option<String> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default()).ok()?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .ok()?;
    Some(result.code)
}
