//! One-shot build of every configured bundle.

use std::time::Instant;

use anyhow::{Result, bail};
use rayon::prelude::*;

use crate::config::Config;
use crate::process;
use crate::store::ArtifactStore;

pub fn build_bundles(config: &Config) -> Result<()> {
    let specs = config.specs()?;
    if specs.is_empty() {
        crate::log!("bundle"; "nothing to build");
        return Ok(());
    }

    let store = ArtifactStore::new();
    let start = Instant::now();

    let results: Vec<_> = specs
        .par_iter()
        .map(|spec| {
            let rendered = process::render(spec, &store)?;
            let version = process::write_rendered(&rendered, &store)?;
            Ok::<_, crate::error::BundleError>((spec.label(), version))
        })
        .collect();

    let mut failures = 0usize;
    for result in results {
        match result {
            Ok((label, version)) => crate::log!("bundle"; "{} ({})", label, version.version()),
            Err(e) => {
                failures += 1;
                crate::log!("error"; "{:#}", anyhow::Error::from(e));
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} bundles failed", specs.len());
    }

    crate::log!("bundle"; "{} bundles built in {:.1?}", specs.len(), start.elapsed());
    Ok(())
}
