//! Criterion benchmarks for Bundlesmith critical paths
//!
//! Benchmarks the core performance-critical operations:
//! - Reference filtering over many tracked assets
//! - Automatic packing by user set
//! - Explicit packing of a bundle layout
//! - Write command generation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use bundlesmith::build::filter::ReferenceFilter;
use bundlesmith::build::steps::auto_packing::AutoPacker;
use bundlesmith::build::steps::commands::generate_commands;
use bundlesmith::build::steps::dependency::CalculateAssetDependencyData;
use bundlesmith::build::steps::packing::ExplicitPacker;
use bundlesmith::build::{
    BuildContent, BuildContext, BuildParameters, BuildServices, BuildStep, BundleLayout, DependencyData,
    PrefabPackedIdentifiers,
};
use bundlesmith::content::{AssetId, AssetRecord, ContentDatabase, ContentManifest, ObjectRecord};

// =============================================================================
// Test Data Generators
// =============================================================================

/// `prefabs` prefabs, each with a few objects referencing a sliding window of
/// shared textures.
fn make_manifest(prefabs: usize) -> ContentManifest {
    let textures = prefabs / 2 + 1;
    let mut manifest = ContentManifest::new();
    for t in 0..textures {
        manifest = manifest.asset(
            AssetRecord::new(&format!("Assets/tex{}.png", t)).object(ObjectRecord::new(1).stream_size(64)),
        );
    }
    for p in 0..prefabs {
        let mut asset = AssetRecord::new(&format!("Assets/prefab{}.prefab", p));
        for local in 1..=4 {
            let texture = (p + local as usize) % textures;
            asset = asset.object(ObjectRecord::new(local).reference(&format!("Assets/tex{}.png", texture), 1));
        }
        manifest = manifest.asset(asset);
    }
    manifest
}

fn prefab_ids(prefabs: usize) -> Vec<AssetId> {
    (0..prefabs).map(|p| AssetId::from_path(&format!("Assets/prefab{}.prefab", p))).collect()
}

/// Resolve dependency data for every prefab.
fn resolve(prefabs: usize) -> (Arc<ContentDatabase>, BuildContent, DependencyData) {
    let db = Arc::new(ContentDatabase::from_manifest(make_manifest(prefabs)).unwrap());
    let content = BuildContent::from_assets(prefab_ids(prefabs), db.as_ref());
    let temp = std::env::temp_dir().join("bundlesmith-bench");
    let mut context = BuildContext::new(
        BuildParameters::new(temp.join("out"), temp.join("tmp")),
        content.clone(),
        BuildServices::new(db.clone()),
    );
    CalculateAssetDependencyData.run(&mut context).unwrap();
    let data = context.take_dependency_data().unwrap();
    (db, content, data)
}

/// One bundle per group of eight prefabs.
fn make_layout(prefabs: usize) -> BundleLayout {
    let mut layout = BundleLayout::new();
    for (i, chunk) in prefab_ids(prefabs).chunks(8).enumerate() {
        layout.add_bundle(format!("bundle{}", i), chunk.to_vec());
    }
    layout
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    for prefabs in [64, 512] {
        let (_db, _content, data) = resolve(prefabs);
        let filter = ReferenceFilter::new(&data.asset_info);
        group.throughput(Throughput::Elements(prefabs as u64));
        group.bench_with_input(BenchmarkId::new("filter_asset", prefabs), &data, |b, data| {
            b.iter(|| {
                for info in data.asset_info.values() {
                    black_box(filter.filter_asset(info));
                }
            })
        });
    }
    group.finish();
}

fn bench_packing(c: &mut Criterion) {
    let mut group = c.benchmark_group("packing");
    for prefabs in [64, 512] {
        let (db, content, data) = resolve(prefabs);
        let layout = make_layout(prefabs);
        group.throughput(Throughput::Elements(prefabs as u64));

        group.bench_with_input(BenchmarkId::new("auto", prefabs), &data, |b, data| {
            let packer = AutoPacker { content: db.as_ref(), identifiers: &PrefabPackedIdentifiers };
            b.iter(|| black_box(packer.pack(&content, data).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("explicit", prefabs), &data, |b, data| {
            let packer = ExplicitPacker { content: db.as_ref(), identifiers: &PrefabPackedIdentifiers };
            b.iter(|| black_box(packer.pack(&layout, data).unwrap()))
        });
    }
    group.finish();
}

fn bench_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("commands");
    for prefabs in [64, 512] {
        let (db, content, data) = resolve(prefabs);
        let packer = AutoPacker { content: db.as_ref(), identifiers: &PrefabPackedIdentifiers };
        let write = packer.pack(&content, &data).unwrap();
        group.throughput(Throughput::Elements(write.file_to_objects.len() as u64));
        group.bench_with_input(BenchmarkId::new("generate", prefabs), &write, |b, write| {
            b.iter(|| black_box(generate_commands(write, &PrefabPackedIdentifiers).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_filter, bench_packing, bench_commands);
criterion_main!(benches);
