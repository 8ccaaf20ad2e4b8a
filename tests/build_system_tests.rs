//! Build System Test Suite
//!
//! Integration tests for the bundle pipeline, driven through [`Build`] against
//! a content database and configuration written into a temporary project:
//!
//! - Explicit and automatic layouts end to end
//! - Determinism of archived bytes
//! - Cache reuse and invalidation
//! - Early stops (unsaved changes, invalid layout, cancellation, callbacks)
//! - Build report

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use bundlesmith::build::progress::{ProgressEvent, ProgressReporter};
use bundlesmith::build::{
    Build, BuildCallbacks, BuildManifest, BuildOutcome, BuildPipeline, BuildProgress, CancelToken, ReturnCode,
};
use bundlesmith::config::{default_config, BundleConfig, Compression};
use bundlesmith::content::{AssetId, AssetRecord, ContentManifest, ObjectId, ObjectRecord};

// ============================================================================
// Test Utilities
// ============================================================================

/// Write `manifest` as the project's content database and return a config
/// rooted at `root`.
fn create_project(root: &Path, manifest: &ContentManifest) -> BundleConfig {
    fs::write(root.join("content.json"), serde_json::to_vec_pretty(manifest).unwrap()).unwrap();
    let mut config = default_config();
    config.project.name = "fixture".to_string();
    config
}

fn with_layout(mut config: BundleConfig, layout: &[(&str, &[&str])]) -> BundleConfig {
    config.layout = layout
        .iter()
        .map(|(name, assets)| (name.to_string(), assets.iter().map(|a| a.to_string()).collect()))
        .collect::<BTreeMap<_, _>>();
    config
}

fn run(root: &Path, config: BundleConfig) -> BuildOutcome {
    Build::new(config, root).run().unwrap()
}

fn step_code(outcome: &BuildOutcome, step: &str) -> Option<ReturnCode> {
    outcome.report.steps.iter().find(|s| s.step == step).map(|s| s.code)
}

fn object(path: &str, local_id: i64) -> ObjectId {
    ObjectId::new(AssetId::from_path(path), local_id, path)
}

/// A prefab and a material sharing a texture, and a scene using the prefab.
fn game_content(texture_source: &str) -> ContentManifest {
    ContentManifest::new()
        .asset(
            AssetRecord::new("Assets/hero.prefab")
                .object(ObjectRecord::new(1).reference("Assets/hero.mat", 1).usage("skinned"))
                .object(ObjectRecord::new(2).reference("Assets/hero.png", 1)),
        )
        .asset(AssetRecord::new("Assets/hero.mat").object(ObjectRecord::new(1).reference("Assets/hero.png", 1)))
        .asset(
            AssetRecord::new("Assets/hero.png")
                .source(texture_source)
                .object(ObjectRecord::new(1).stream_size(256)),
        )
        .asset(
            AssetRecord::scene("Assets/level.scene")
                .object(ObjectRecord::new(1).reference("Assets/hero.prefab", 1)),
        )
}

fn explicit(root: &Path, texture_source: &str) -> BundleConfig {
    let config = create_project(root, &game_content(texture_source));
    with_layout(
        config,
        &[
            ("characters", &["Assets/hero.prefab"]),
            ("materials", &["Assets/hero.mat"]),
            ("levels", &["Assets/level.scene"]),
        ],
    )
}

/// Reporter capturing every event.
#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressEvent>>);

impl ProgressReporter for Recorder {
    fn report(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// ============================================================================
// Explicit Layout
// ============================================================================

#[test]
fn test_explicit_layout_end_to_end() {
    let temp = TempDir::new().unwrap();
    let outcome = run(temp.path(), explicit(temp.path(), "v1"));

    assert_eq!(outcome.report.code, ReturnCode::Success, "{}", outcome.report.summary());
    let results = outcome.results.unwrap();
    let bundles: Vec<&str> = results.bundle_details.keys().map(String::as_str).collect();
    assert_eq!(bundles, vec!["characters", "levels", "materials"]);
    for details in results.bundle_details.values() {
        assert!(details.file_name.starts_with(temp.path().join("build/bundles")));
        assert_eq!(fs::metadata(&details.file_name).unwrap().len(), details.size);
    }
    assert!(results.bundle_details["levels"].dependencies.contains(&"characters".to_string()));
}

#[test]
fn test_dependency_cycle_keeps_one_copy() {
    let temp = TempDir::new().unwrap();
    let manifest = ContentManifest::new()
        .asset(AssetRecord::new("Assets/a.prefab").object(ObjectRecord::new(1).reference("Assets/b.prefab", 1)))
        .asset(AssetRecord::new("Assets/b.prefab").object(ObjectRecord::new(1).reference("Assets/a.prefab", 1)));
    let config = with_layout(
        create_project(temp.path(), &manifest),
        &[("a", &["Assets/a.prefab"]), ("b", &["Assets/b.prefab"])],
    );

    let mut context = Build::new(config, temp.path()).context().unwrap();
    let report = BuildPipeline::default_pipeline().run(&mut context);
    assert!(report.is_success(), "{}", report.summary());

    let write = context.write_data().unwrap();
    for object in [object("Assets/a.prefab", 1), object("Assets/b.prefab", 1)] {
        let holders = write.file_to_objects.values().filter(|objects| objects.contains(&object)).count();
        assert_eq!(holders, 1, "{object} held by {holders} files");
    }
}

#[test]
fn test_no_object_in_two_files() {
    let temp = TempDir::new().unwrap();
    let mut context = Build::new(explicit(temp.path(), "v1"), temp.path()).context().unwrap();
    let report = BuildPipeline::default_pipeline().run(&mut context);
    assert!(report.is_success(), "{}", report.summary());

    let write = context.write_data().unwrap();
    let mut seen = BTreeSet::new();
    for objects in write.file_to_objects.values() {
        for object in objects {
            assert!(seen.insert(object.clone()), "{object} written twice");
        }
    }
    assert!(seen.contains(&object("Assets/hero.png", 1)));
}

#[test]
fn test_scene_bundle_shares_common_objects() {
    let temp = TempDir::new().unwrap();
    let manifest = ContentManifest::new()
        .asset(AssetRecord::scene("Assets/a.scene").object(ObjectRecord::new(1).reference("Assets/rock.png", 1)))
        .asset(AssetRecord::scene("Assets/b.scene").object(ObjectRecord::new(1).reference("Assets/rock.png", 1)))
        .asset(AssetRecord::new("Assets/rock.png").object(ObjectRecord::new(1)));
    let config = with_layout(
        create_project(temp.path(), &manifest),
        &[("levels", &["Assets/a.scene", "Assets/b.scene"])],
    );

    let mut context = Build::new(config, temp.path()).context().unwrap();
    let report = BuildPipeline::default_pipeline().run(&mut context);
    assert!(report.is_success(), "{}", report.summary());

    let write = context.write_data().unwrap();
    let rock_file = write.file_of(&object("Assets/rock.png", 1)).unwrap();
    assert!(rock_file.ends_with(".sharedAssets"));
    assert_eq!(write.scene_files.len(), 2);
}

#[test]
fn test_invalid_layout_stops_build() {
    let temp = TempDir::new().unwrap();
    let config = with_layout(
        create_project(temp.path(), &game_content("v1")),
        &[("mixed", &["Assets/hero.prefab", "Assets/level.scene"])],
    );
    let outcome = run(temp.path(), config);

    assert_eq!(outcome.report.code, ReturnCode::Error);
    assert_eq!(outcome.report.failed_step().unwrap().step, "validate-bundle-layout");
    assert!(step_code(&outcome, "write-serialized-files").is_none());
    assert!(!temp.path().join("build/bundles").join("mixed").exists());
}

// ============================================================================
// Automatic Layout
// ============================================================================

#[test]
fn test_auto_layout_shared_bundle() {
    let temp = TempDir::new().unwrap();
    let manifest = ContentManifest::new()
        .asset(AssetRecord::new("Assets/x.prefab").object(
            ObjectRecord::new(1).reference("Assets/o1.png", 1).reference("Assets/o2.png", 1),
        ))
        .asset(AssetRecord::new("Assets/y.prefab").object(
            ObjectRecord::new(1).reference("Assets/o2.png", 1).reference("Assets/o3.png", 1),
        ))
        .asset(AssetRecord::new("Assets/o1.png").object(ObjectRecord::new(1)))
        .asset(AssetRecord::new("Assets/o2.png").object(ObjectRecord::new(1)))
        .asset(AssetRecord::new("Assets/o3.png").object(ObjectRecord::new(1)));
    let outcome = run(temp.path(), create_project(temp.path(), &manifest));

    assert!(outcome.report.is_success(), "{}", outcome.report.summary());
    assert_eq!(step_code(&outcome, "generate-bundle-packing"), Some(ReturnCode::SuccessNotRun));
    assert_eq!(step_code(&outcome, "auto-bundle-packing"), Some(ReturnCode::Success));

    // Each png is a user of its own object, so o1, o2 and o3 have user sets
    // {o1, x}, {o2, x, y} and {o3, y}: three distinct shared bundles.
    let results = outcome.results.unwrap();
    let shared: Vec<_> = results.bundle_details.keys().filter(|name| name.starts_with("SHARED-")).collect();
    assert_eq!(shared.len(), 3);
    assert!(results.bundle_details.contains_key("Assets/x.prefab"));
}

// ============================================================================
// Determinism and Caching
// ============================================================================

fn archive_bytes(outcome: &BuildOutcome) -> BTreeMap<String, Vec<u8>> {
    outcome
        .results
        .as_ref()
        .unwrap()
        .bundle_details
        .iter()
        .map(|(name, details)| (name.clone(), fs::read(&details.file_name).unwrap()))
        .collect()
}

#[test]
fn test_identical_inputs_give_identical_bytes() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let first = run(first_dir.path(), explicit(first_dir.path(), "v1"));
    let second = run(second_dir.path(), explicit(second_dir.path(), "v1"));

    assert!(first.report.is_success() && second.report.is_success());
    assert_eq!(archive_bytes(&first), archive_bytes(&second));
}

#[test]
fn test_second_build_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let first = run(temp.path(), explicit(temp.path(), "v1"));
    assert_eq!(step_code(&first, "write-serialized-files"), Some(ReturnCode::Success));

    let second = run(temp.path(), explicit(temp.path(), "v1"));
    for step in [
        "calculate-scene-dependency-data",
        "calculate-asset-dependency-data",
        "write-serialized-files",
        "archive-and-compress-bundles",
    ] {
        assert_eq!(step_code(&second, step), Some(ReturnCode::SuccessCached), "{step}");
    }
    assert_eq!(archive_bytes(&first), archive_bytes(&second));
    assert!(second.cache_stats.unwrap().hits > 0);
}

#[test]
fn test_changed_source_invalidates_cache() {
    let temp = TempDir::new().unwrap();
    let first = run(temp.path(), explicit(temp.path(), "v1"));
    let second = run(temp.path(), explicit(temp.path(), "v2"));

    assert_eq!(step_code(&second, "calculate-asset-dependency-data"), Some(ReturnCode::Success));
    assert_eq!(step_code(&second, "write-serialized-files"), Some(ReturnCode::Success));
    assert!(second.report.is_success());
    assert_eq!(archive_bytes(&first).len(), archive_bytes(&second).len());
}

#[test]
fn test_cache_disabled_never_caches() {
    let temp = TempDir::new().unwrap();
    let mut config = explicit(temp.path(), "v1");
    config.build.use_cache = false;
    run(temp.path(), config.clone());
    let second = run(temp.path(), config);

    assert_eq!(step_code(&second, "write-serialized-files"), Some(ReturnCode::Success));
    assert!(second.cache_stats.is_none());
    assert!(!temp.path().join("build/cache").exists());
}

#[test]
fn test_compression_changes_archives() {
    let temp = TempDir::new().unwrap();
    let mut config = explicit(temp.path(), "v1");
    config.build.compression = Compression::None;
    let plain = archive_bytes(&run(temp.path(), config.clone()));
    config.build.compression = Compression::Lz4;
    let packed = run(temp.path(), config);

    assert_eq!(step_code(&packed, "archive-and-compress-bundles"), Some(ReturnCode::Success));
    assert_ne!(plain["characters"], archive_bytes(&packed)["characters"]);
}

#[test]
fn test_append_hash_file_names() {
    let temp = TempDir::new().unwrap();
    let mut config = explicit(temp.path(), "v1");
    config.build.append_hash = true;
    let outcome = run(temp.path(), config);

    for (name, details) in &outcome.results.unwrap().bundle_details {
        let file: PathBuf = details.file_name.file_name().unwrap().into();
        assert_eq!(file, PathBuf::from(format!("{}_{}", name, details.hash.to_hex())));
    }
}

// ============================================================================
// Early Stops
// ============================================================================

#[test]
fn test_unsaved_changes_stop_build() {
    let temp = TempDir::new().unwrap();
    let mut manifest = game_content("v1");
    manifest.unsaved_changes = true;
    let outcome = run(temp.path(), create_project(temp.path(), &manifest));

    assert_eq!(outcome.report.code, ReturnCode::UnsavedChanges);
    assert_eq!(outcome.report.steps.len(), 1);
    assert!(!temp.path().join("build/bundles").exists());
}

#[test]
fn test_canceled_build() {
    let temp = TempDir::new().unwrap();
    let token = CancelToken::new();
    token.cancel();
    let outcome = Build::new(explicit(temp.path(), "v1"), temp.path())
        .progress(BuildProgress::silent().with_cancel_token(token))
        .run()
        .unwrap();

    assert_eq!(outcome.report.code, ReturnCode::Canceled);
    assert!(outcome.results.is_none());
}

#[test]
fn test_callback_error_stops_build() {
    let temp = TempDir::new().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let callbacks = BuildCallbacks::default().with_post_packing(move |_, _, write| {
        counter.store(write.file_to_objects.len(), Ordering::SeqCst);
        ReturnCode::Error
    });
    let outcome = Build::new(explicit(temp.path(), "v1"), temp.path()).callbacks(callbacks).run().unwrap();

    assert_eq!(outcome.report.code, ReturnCode::Error);
    assert_eq!(outcome.report.failed_step().unwrap().step, "post-packing-callback");
    assert!(seen.load(Ordering::SeqCst) > 0);
}

// ============================================================================
// Progress and Report
// ============================================================================

#[test]
fn test_progress_events_cover_every_step() {
    let temp = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let outcome = Build::new(explicit(temp.path(), "v1"), temp.path())
        .progress(BuildProgress::new(recorder.clone()))
        .run()
        .unwrap();

    let events = recorder.0.lock().unwrap();
    let started = events.iter().filter(|e| matches!(e, ProgressEvent::StepStarted { .. })).count();
    assert_eq!(started, outcome.report.steps.len());
    assert!(matches!(events.last(), Some(ProgressEvent::BuildCompleted { code: ReturnCode::Success, .. })));
}

#[test]
fn test_build_manifest_written() {
    let temp = TempDir::new().unwrap();
    let outcome = run(temp.path(), explicit(temp.path(), "v1"));

    let manifest = BuildManifest::load_from_dir(&temp.path().join("build/bundles")).unwrap().unwrap();
    assert_eq!(manifest.len(), outcome.results.unwrap().bundle_details.len());
    assert_eq!(manifest.steps.len(), outcome.report.steps.len());
    assert!(manifest.verify_outputs().unwrap().is_empty());

    let characters = &manifest.bundles["characters"].file;
    fs::write(characters, b"tampered").unwrap();
    assert_eq!(manifest.verify_outputs().unwrap(), vec!["characters".to_string()]);
}
