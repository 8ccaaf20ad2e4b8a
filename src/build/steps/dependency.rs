//! Dependency resolution for scenes and assets.
//!
//! Both steps key their cache records on the asset's own hash plus the hash
//! of every asset it transitively depends on, so editing a dependency
//! invalidates the dependents. Lookups may run on the rayon pool; the
//! computation of misses stays sequential and polls for cancellation before
//! each item.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::build::cache::{BuildCache, CacheEntry, CachedInfo};
use crate::build::context::BuildContext;
use crate::build::dependency_data::DependencyData;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;
use crate::content::ids::{AssetId, Hash128, HashBuilder};
use crate::content::info::{AssetLoadInfo, SceneDependencyInfo};
use crate::content::service::ContentService;
use crate::content::usage::{GlobalUsage, UsageTagSet};

const SCENE_STEP_VERSION: u32 = 2;
const ASSET_STEP_VERSION: u32 = 3;

/// Cached output of the scene step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SceneRecord {
    info: SceneDependencyInfo,
    usage: UsageTagSet,
}

/// Cached output of the asset step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AssetRecord {
    info: AssetLoadInfo,
    usage: UsageTagSet,
}

/// Compute cache entries for `assets` and look them all up.
fn lookup<T>(
    cache: Option<&BuildCache>,
    content: &dyn ContentService,
    assets: &[AssetId],
    version: u32,
    extra: &[Hash128],
    parallel: bool,
) -> Result<(Vec<Option<CacheEntry>>, Vec<Option<CachedInfo<T>>>), BuildError>
where
    T: serde::de::DeserializeOwned + Send,
{
    let Some(cache) = cache else {
        return Ok((vec![None; assets.len()], assets.iter().map(|_| None).collect()));
    };
    let entries = assets
        .iter()
        .map(|asset| cache.asset_entry(content, asset, version, extra))
        .collect::<Result<Vec<_>, _>>()?;
    let loaded = cache.try_load_many(&entries, parallel);
    Ok((entries.into_iter().map(Some).collect(), loaded))
}

/// Resolves every scene in the build.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculateSceneDependencyData;

impl BuildStep for CalculateSceneDependencyData {
    fn name(&self) -> &'static str {
        "calculate-scene-dependency-data"
    }

    fn version(&self) -> u32 {
        SCENE_STEP_VERSION
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let scenes = context.content().scenes.clone();
        let mut data = context.take_dependency_data().unwrap_or_default();
        let outcome = self.resolve(context, &scenes, &mut data);
        context.set_dependency_data(data);
        outcome
    }
}

impl CalculateSceneDependencyData {
    fn resolve(
        &self,
        context: &BuildContext,
        scenes: &[AssetId],
        data: &mut DependencyData,
    ) -> Result<ReturnCode, BuildError> {
        if scenes.is_empty() {
            return Ok(ReturnCode::SuccessNotRun);
        }

        let content = context.services().content.as_ref();
        let cache = context.cache();
        let temp = context.parameters().temp_output_folder.clone();
        let (entries, loaded) = lookup::<SceneRecord>(
            cache.as_deref(),
            content,
            scenes,
            self.version(),
            &[],
            context.parameters().parallel_cache_lookups,
        )?;

        let mut all_cached = true;
        for (index, ((scene, entry), cached)) in scenes.iter().zip(entries).zip(loaded).enumerate() {
            let path = content.asset_path(scene)?;
            if !context.progress().update(self.name(), &path, index, scenes.len()) {
                return Ok(ReturnCode::Canceled);
            }

            let cached = cached.filter(|info| info.data.info.processed_scene.exists());
            let record = match cached {
                Some(info) => info.data,
                None => {
                    all_cached = false;
                    let processed = content.process_scene(scene, &temp)?;
                    let usage = content.usage_tags(&processed.referenced_objects, processed.global_usage)?;
                    let mut info = SceneDependencyInfo::new(*scene, processed.processed_scene);
                    info.referenced_objects = processed.referenced_objects;
                    info.global_usage = processed.global_usage;
                    let record = SceneRecord { info, usage };
                    match (cache.as_deref(), entry) {
                        (Some(cache), Some(entry)) => save_scene(cache, &entry, record),
                        _ => record,
                    }
                }
            };

            debug!(scene = %path, references = record.info.referenced_objects.len(), "scene resolved");
            data.global_usage |= record.info.global_usage;
            data.scene_usage.insert(*scene, record.usage);
            data.scene_info.insert(*scene, record.info);
        }

        Ok(if all_cached { ReturnCode::SuccessCached } else { ReturnCode::Success })
    }
}

/// Move the processed scene into the cache and record it there. On failure
/// the record keeps pointing at the temp copy.
fn save_scene(cache: &BuildCache, entry: &CacheEntry, mut record: SceneRecord) -> SceneRecord {
    let source: PathBuf = record.info.processed_scene.clone();
    match cache.store_artifacts(entry, std::slice::from_ref(&source)) {
        Ok(stored) => {
            if let Some(path) = stored.into_iter().next() {
                record.info.processed_scene = path;
            }
            cache.try_save(entry, Vec::new(), &record);
        }
        Err(err) => warn!(scene = %record.info.scene, error = %err, "failed to cache processed scene"),
    }
    record
}

/// Resolves every non-scene asset in the build.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculateAssetDependencyData;

impl BuildStep for CalculateAssetDependencyData {
    fn name(&self) -> &'static str {
        "calculate-asset-dependency-data"
    }

    fn version(&self) -> u32 {
        ASSET_STEP_VERSION
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let assets = context.content().assets.clone();
        let mut data = context.take_dependency_data().unwrap_or_default();
        let outcome = self.resolve(context, &assets, &mut data);
        context.set_dependency_data(data);
        outcome
    }
}

impl CalculateAssetDependencyData {
    fn resolve(
        &self,
        context: &BuildContext,
        assets: &[AssetId],
        data: &mut DependencyData,
    ) -> Result<ReturnCode, BuildError> {
        if assets.is_empty() {
            return Ok(ReturnCode::SuccessNotRun);
        }

        let content = context.services().content.as_ref();
        let cache = context.cache();
        let global = data.global_usage;
        let (entries, loaded) = lookup::<AssetRecord>(
            cache.as_deref(),
            content,
            assets,
            self.version(),
            &[usage_input(global)],
            context.parameters().parallel_cache_lookups,
        )?;

        let mut all_cached = true;
        for (index, ((asset, entry), cached)) in assets.iter().zip(entries).zip(loaded).enumerate() {
            let path = content.asset_path(asset)?;
            if !context.progress().update(self.name(), &path, index, assets.len()) {
                return Ok(ReturnCode::Canceled);
            }

            let mut record = match cached {
                Some(info) => info.data,
                None => {
                    all_cached = false;
                    let included = content.objects_in_asset(asset)?;
                    let referenced = content.referenced_objects(&included)?;
                    let usage = content.usage_tags(&included, global)?;
                    let mut info = AssetLoadInfo::new(*asset);
                    info.included_objects = included;
                    info.referenced_objects = referenced;
                    let record = AssetRecord { info, usage };
                    if let (Some(cache), Some(entry)) = (cache.as_deref(), entry) {
                        cache.try_save(&entry, Vec::new(), &record);
                    }
                    record
                }
            };

            record.info.address = context.content().addresses.get(asset).cloned();
            debug!(
                asset = %path,
                included = record.info.included_objects.len(),
                referenced = record.info.referenced_objects.len(),
                "asset resolved"
            );
            data.asset_usage.insert(*asset, record.usage);
            data.asset_info.insert(*asset, record.info);
        }

        Ok(if all_cached { ReturnCode::SuccessCached } else { ReturnCode::Success })
    }
}

fn usage_input(global: GlobalUsage) -> Hash128 {
    let mut builder = HashBuilder::new();
    builder.str("global-usage").u32(global.bits());
    builder.finish()
}
