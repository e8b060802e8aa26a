use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::*;
use crate::bundle::{SourceMode, SpriteBundle, TextBundle, TextSource};
use crate::monitor::testing::MockMonitor;
use crate::monitor::{WatchEvent, WatchReason};

fn setup(limit: usize) -> (TempDir, Arc<MockMonitor>, Arc<BundleCache>) {
    let temp = TempDir::new().unwrap();
    let monitor = MockMonitor::new();
    let cache = BundleCache::new(monitor.clone() as Arc<dyn crate::monitor::PathMonitor>, limit);
    (temp, monitor, cache)
}

fn write_source(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.canonicalize().unwrap()
}

/// Verbatim-only script bundle, so the output is the plain concatenation
/// and assertions can compare exact bytes.
fn script_spec(dir: &Path, output_name: &str, sources: &[PathBuf]) -> BundleSpec {
    BundleSpec::Script(TextBundle {
        output: dir.join("out").join(output_name),
        url: format!("/js/{output_name}"),
        sources: sources
            .iter()
            .map(|path| TextSource {
                path: path.clone(),
                mode: SourceMode::Verbatim,
            })
            .collect(),
    })
}

#[test]
fn test_add_installs_entry_and_watch() {
    let (temp, monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source.clone()]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();

    assert!(cache.contains(&key));
    assert_eq!(monitor.len(), 1);

    // Watch set covers the output and every source.
    let paths = monitor.paths_of(&key).unwrap();
    assert!(paths.contains(&source));
    assert!(paths.iter().any(|p| p.ends_with("out/app.js")));

    let output = fs::read_to_string(spec.primary_output()).unwrap();
    assert_eq!(output, "var a = 1;\n");
}

#[test]
fn test_add_failure_installs_nothing() {
    let (temp, monitor, cache) = setup(16);
    let spec = script_spec(temp.path(), "app.js", &[temp.path().join("missing.js")]);

    let err = cache.add(spec).unwrap_err();
    assert!(matches!(err, BundleError::Read { .. }));
    assert!(cache.is_empty());
    assert_eq!(monitor.len(), 0);
}

#[test]
fn test_add_empty_sprite_is_invalid() {
    let (temp, monitor, cache) = setup(16);
    let spec = BundleSpec::Sprite(SpriteBundle {
        image: temp.path().join("out/icons.png"),
        stylesheet: temp.path().join("out/icons.css"),
        image_url: "/img/icons.png".into(),
        class_prefix: "sprite".into(),
        sources: vec![],
    });

    let err = cache.add(spec).unwrap_err();
    assert!(matches!(err, BundleError::Invalid(_)));
    assert!(cache.is_empty());
    assert_eq!(monitor.len(), 0);
}

#[test]
fn test_readd_unchanged_is_idempotent() {
    let (temp, _monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();
    let first_bytes = fs::read(spec.primary_output()).unwrap();
    let first_version = cache.version_of(&key).unwrap();

    cache.add(spec.clone()).unwrap();
    assert_eq!(fs::read(spec.primary_output()).unwrap(), first_bytes);
    assert_eq!(cache.version_of(&key).unwrap(), first_version);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_changed_event_regenerates() {
    let (temp, monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source.clone()]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();
    let old_version = cache.version_of(&key).unwrap();

    fs::write(&source, "var a = 2;\n").unwrap();
    assert!(monitor.fire(&key, WatchReason::Changed));

    let output = fs::read_to_string(spec.primary_output()).unwrap();
    assert_eq!(output, "var a = 2;\n");
    assert_ne!(cache.version_of(&key).unwrap(), old_version);
    assert_eq!(monitor.len(), 1, "regeneration re-registers the watch");
}

#[test]
fn test_evicted_rewatches_without_reprocessing() {
    let (temp, monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source.clone()]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();
    let version = cache.version_of(&key).unwrap();

    // Source content moves on disk, but eviction must NOT reprocess —
    // only a Changed event may touch the output.
    fs::write(&source, "var a = 99;\n").unwrap();

    for reason in [
        WatchReason::Evicted,
        WatchReason::Expired,
        WatchReason::Evicted,
        WatchReason::Expired,
        WatchReason::Evicted,
    ] {
        assert!(monitor.fire(&key, reason), "watch lost after {reason:?}");
    }

    assert_eq!(monitor.len(), 1, "still watching after N evictions");
    assert_eq!(
        fs::read_to_string(spec.primary_output()).unwrap(),
        "var a = 1;\n",
        "cheap path must not rewrite the output"
    );
    assert_eq!(cache.version_of(&key).unwrap(), version);

    // The Changed path still works after all those cheap cycles.
    assert!(monitor.fire(&key, WatchReason::Changed));
    assert_eq!(
        fs::read_to_string(spec.primary_output()).unwrap(),
        "var a = 99;\n"
    );
}

#[test]
fn test_remove_tears_down_watch() {
    let (temp, monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source.clone()]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();
    cache.remove(&key);

    assert!(cache.is_empty());
    assert_eq!(monitor.len(), 0);

    // A straggler event for the removed key is ignored: no reprocessing.
    fs::write(&source, "var a = 2;\n").unwrap();
    cache.on_watch_event(WatchEvent {
        key: key.clone(),
        reason: WatchReason::Changed,
    });
    assert_eq!(
        fs::read_to_string(spec.primary_output()).unwrap(),
        "var a = 1;\n"
    );
    assert!(cache.is_empty());
    assert_eq!(monitor.len(), 0);
}

#[test]
fn test_remove_absent_key_is_idempotent() {
    let (_temp, monitor, cache) = setup(16);
    cache.remove("script:/nonexistent");
    cache.remove("script:/nonexistent");
    assert!(cache.is_empty());
    assert_eq!(monitor.len(), 0);
}

#[test]
fn test_remove_wins_against_inflight_rebuild() {
    let (temp, monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();

    // A rebuild starts, then remove lands before it commits.
    let inflight = cache.begin_generation(&key);
    cache.remove(&key);

    assert_eq!(cache.rebuild(&key, &spec, inflight).unwrap(), None);
    let installed = cache
        .install(key.clone(), spec, inflight, crate::hashing::ContentHash::of(b""))
        .unwrap();

    assert!(!installed, "a rebuild finishing after remove must not reinstall");
    assert!(cache.is_empty());
    assert_eq!(monitor.len(), 0);
}

#[test]
fn test_overlapping_rebuilds_later_generation_wins() {
    let (temp, _monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source.clone()]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();

    fs::write(&source, "var a = 2;\n").unwrap();

    // Two Changed events overlap: A starts first, B starts second,
    // B completes first, A completes last.
    let generation_a = cache.begin_generation(&key);
    let generation_b = cache.begin_generation(&key);

    let version_b = cache.rebuild(&key, &spec, generation_b).unwrap().unwrap();
    assert!(cache.install(key.clone(), spec.clone(), generation_b, version_b).unwrap());

    // A is stale: it neither writes nor installs.
    assert_eq!(cache.rebuild(&key, &spec, generation_a).unwrap(), None);
    let installed = cache
        .install(key.clone(), spec.clone(), generation_a, version_b)
        .unwrap();
    assert!(!installed);

    let entry_generation = cache.entries.get(&key).unwrap().generation;
    assert_eq!(entry_generation, generation_b);
    assert_eq!(
        fs::read_to_string(spec.primary_output()).unwrap(),
        "var a = 2;\n"
    );
}

#[test]
fn test_capacity_limit_is_enforced() {
    let (temp, _monitor, cache) = setup(1);
    let source_a = write_source(temp.path(), "a.js", "var a = 1;\n");
    let source_b = write_source(temp.path(), "b.js", "var b = 1;\n");

    let first = script_spec(temp.path(), "a.js", &[source_a.clone()]);
    let second = script_spec(temp.path(), "b.js", &[source_b]);

    cache.add(first.clone()).unwrap();

    let err = cache.add(second).unwrap_err();
    assert!(matches!(err, BundleError::CapacityReached { limit: 1 }));

    // Rebuilding an existing key is not growth.
    cache.add(first).unwrap();
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_deleted_source_leaves_stale_entry_watched() {
    let (temp, monitor, cache) = setup(16);
    let source = write_source(temp.path(), "a.js", "var a = 1;\n");
    let spec = script_spec(temp.path(), "app.js", &[source.clone()]);
    let key = spec.cache_key();

    cache.add(spec.clone()).unwrap();
    let version = cache.version_of(&key).unwrap();

    // A deleted source is just a Changed event whose rebuild fails; the
    // stale entry and its registration survive for a later restore.
    fs::remove_file(&source).unwrap();
    assert!(monitor.fire(&key, WatchReason::Changed));

    assert!(cache.contains(&key));
    assert_eq!(cache.version_of(&key).unwrap(), version);
    assert_eq!(
        fs::read_to_string(spec.primary_output()).unwrap(),
        "var a = 1;\n"
    );
    assert_eq!(monitor.len(), 1);

    // Restoring the file heals on the next event.
    fs::write(&source, "var a = 3;\n").unwrap();
    assert!(monitor.fire(&key, WatchReason::Changed));
    assert_eq!(
        fs::read_to_string(spec.primary_output()).unwrap(),
        "var a = 3;\n"
    );
}

#[test]
fn test_failed_add_key_can_be_added_after_fix() {
    let (temp, monitor, cache) = setup(16);
    let missing = temp.path().join("late.js");
    let spec = script_spec(temp.path(), "app.js", &[missing.clone()]);

    assert!(cache.add(spec.clone()).is_err());

    fs::write(&missing, "var late = 1;\n").unwrap();
    cache.add(spec.clone()).unwrap();
    assert!(cache.contains(&spec.cache_key()));
    assert_eq!(monitor.len(), 1);
}
