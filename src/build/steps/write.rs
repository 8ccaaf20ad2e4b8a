//! Serialization of every write command, cache-checked.
//!
//! A command's cache key covers the command itself, the target settings, the
//! file's usage tags, its preload list, and where the preloaded objects live.
//! The record also lists the source hash of every asset whose objects the
//! file holds; a hit is only trusted if none of them changed and the stored
//! artifacts are still present.

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::build::cache::{BuildCache, CacheEntry};
use crate::build::context::{BuildContext, ContextObject};
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::{ReturnCode, WriteResult};
use crate::build::write_data::{WriteCommand, WriteData};
use crate::content::ids::{AssetId, Hash128, HashBuilder, ObjectId};
use crate::content::service::{ContentService, WriteRequest};
use crate::content::usage::UsageTagSet;

const WRITE_STEP_VERSION: u32 = 1;

/// Directory below the temp folder receiving serialized files.
const WRITE_DIRNAME: &str = "write";

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteSerializedFiles;

impl BuildStep for WriteSerializedFiles {
    fn name(&self) -> &'static str {
        "write-serialized-files"
    }

    fn version(&self) -> u32 {
        WRITE_STEP_VERSION
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::WriteData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let write = context.take_write_data()?;
        let outcome = self.write_all(context, &write);
        context.set_write_data(write);
        outcome
    }
}

impl WriteSerializedFiles {
    fn write_all(&self, context: &mut BuildContext, write: &WriteData) -> Result<ReturnCode, BuildError> {
        let services = context.services().clone();
        let cache = context.cache();
        let params = context.parameters().clone();
        let settings_hash = params.settings_hash();
        let output_folder = params.temp_output_folder.join(WRITE_DIRNAME);
        let empty_usage = UsageTagSet::new();
        let total = write.write_commands.len();
        context.results_mut();

        let mut all_cached = total > 0;
        for (index, command) in write.write_commands.iter().enumerate() {
            if !context.progress().update(self.name(), &command.internal_name, index, total) {
                return Ok(ReturnCode::Canceled);
            }

            let usage = write.file_to_usage.get(&command.internal_name).unwrap_or(&empty_usage);
            let preload = write.preload_info.get(&command.internal_name).map(Vec::as_slice).unwrap_or(&[]);
            let request = WriteRequest {
                settings: &params.settings,
                usage,
                reference_map: &write.reference_map,
                preload,
                content: services.content.as_ref(),
                output_folder: &output_folder,
            };

            let keyed = match cache.as_deref() {
                Some(cache) => Some((cache, self.cache_entry(command, &request, settings_hash)?)),
                None => None,
            };
            let cached = keyed.as_ref().and_then(|(cache, entry)| load_valid(cache, entry, services.content.as_ref()));

            let result = match cached {
                Some(result) => {
                    debug!(file = %command.internal_name, "write served from cache");
                    result
                }
                None => {
                    all_cached = false;
                    let result = services.serializer.write(command, &request)?;
                    match keyed {
                        Some((cache, entry)) => {
                            let dependencies = source_entries(command, services.content.as_ref())?;
                            store(cache, &entry, dependencies, result)
                        }
                        None => result,
                    }
                }
            };

            context.results_mut().write_results.insert(command.internal_name.clone(), result);
        }

        Ok(if all_cached { ReturnCode::SuccessCached } else { ReturnCode::Success })
    }

    fn cache_entry(
        &self,
        command: &WriteCommand,
        request: &WriteRequest<'_>,
        settings_hash: Hash128,
    ) -> Result<CacheEntry, BuildError> {
        let locations: Vec<_> = request.preload.iter().map(|object| request.reference_map.get(object)).collect();
        let mut builder = HashBuilder::new();
        builder
            .json(command)?
            .hash(&settings_hash)
            .hash(&request.usage.content_hash())
            .json(request.preload)?
            .json(&locations)?;
        if let Some(scene) = &command.scene {
            builder.hash(&request.content.asset_hash(&scene.scene)?);
        }
        Ok(CacheEntry::file(Hash128::of_str(&command.internal_name), self.version(), &[builder.finish()]))
    }
}

/// Source entries of every asset whose objects the command writes, and of
/// the scene it holds.
fn source_entries(command: &WriteCommand, content: &dyn ContentService) -> Result<Vec<CacheEntry>, BuildError> {
    let mut assets: BTreeSet<AssetId> = command
        .serialize_objects
        .iter()
        .map(|info| &info.object)
        .filter(|object: &&ObjectId| !object.is_builtin())
        .map(|object| object.asset)
        .collect();
    if let Some(scene) = &command.scene {
        assets.insert(scene.scene);
    }
    assets
        .into_iter()
        .map(|asset| Ok(CacheEntry::asset_source(&asset, content.asset_hash(&asset)?)))
        .collect()
}

/// Load a record whose sources are unchanged and whose artifacts exist.
fn load_valid(cache: &BuildCache, entry: &CacheEntry, content: &dyn ContentService) -> Option<WriteResult> {
    let info = cache.try_load::<WriteResult>(entry)?;
    let changed = cache.has_changed(&info.dependencies, |recorded| {
        let asset = AssetId::new(recorded.key);
        content.asset_hash(&asset).ok().map(|hash| CacheEntry::asset_source(&asset, hash))
    });
    let present = info.data.resource_files.iter().all(|file| file.path.exists());
    (!changed && present).then_some(info.data)
}

/// Move the written files into the cache and record the result. If the
/// artifacts cannot be stored the temp copies are used.
fn store(cache: &BuildCache, entry: &CacheEntry, dependencies: Vec<CacheEntry>, mut result: WriteResult) -> WriteResult {
    let paths: Vec<PathBuf> = result.resource_files.iter().map(|file| file.path.clone()).collect();
    match cache.store_artifacts(entry, &paths) {
        Ok(stored) => {
            for (file, path) in result.resource_files.iter_mut().zip(stored) {
                file.path = path;
            }
            cache.try_save(entry, dependencies, &result);
        }
        Err(err) => warn!(file = %result.internal_name, error = %err, "failed to store written files in cache"),
    }
    result
}
