//! Watch mode: build everything, then keep bundles fresh until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::bounded;

use crate::cache::BundleCache;
use crate::config::Config;
use crate::monitor::{FsMonitor, MonitorOptions};

pub fn watch_bundles(config: &Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("installing ctrl-c handler")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async {
        // Watcher first: events buffer while the initial builds run, so
        // a source edited mid-build is not missed.
        let monitor = FsMonitor::spawn(MonitorOptions {
            debounce: Duration::from_millis(config.watch.debounce_ms),
            capacity: config.watch.capacity,
            expire_after: config.watch.expire_secs.map(Duration::from_secs),
        })?;

        let cache = BundleCache::new(
            monitor as Arc<dyn crate::monitor::PathMonitor>,
            config.watch.max_bundles,
        );

        let specs = config.specs()?;
        let total = specs.len();
        let mut failures = 0usize;

        for spec in specs {
            let label = spec.label();
            let cache = Arc::clone(&cache);
            let added = tokio::task::spawn_blocking(move || cache.add(spec))
                .await
                .context("initial build task")?;

            match added {
                Ok(()) => crate::debug!("bundle"; "added {}", label),
                Err(e) => {
                    failures += 1;
                    crate::log!("error"; "{}: {}", label, e);
                }
            }
        }

        if failures > 0 {
            crate::log!("watch"; "{} of {} bundles failed to build; they will not self-heal", failures, total);
        }
        crate::log!("watch"; "watching {} bundles (ctrl-c to stop)", cache.len());

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        crate::debug!("watch"; "stopped");
        Ok(())
    })
}
