//! Print reference markup for one configured bundle.

use anyhow::Result;

use crate::config::Config;
use crate::error::BundleError;
use crate::refs::{self, RefMode};
use crate::store::ArtifactStore;

pub fn print_refs(config: &Config, output: &str, debug: bool) -> Result<()> {
    let specs = config.specs()?;
    let spec = specs
        .into_iter()
        .find(|spec| {
            spec.output_paths()
                .iter()
                .any(|path| path.ends_with(output))
        })
        .ok_or_else(|| BundleError::UnknownBundle(output.to_string()))?;

    let mode = if debug {
        RefMode::Debug
    } else {
        RefMode::Bundled
    };

    let markup = refs::render_markup(&spec, mode, &ArtifactStore::new(), config.root())?;
    print!("{markup}");
    Ok(())
}
