//! Bundle archiving.
//!
//! Every bundle's written files are packed into one archive in the output
//! folder. Archives are cached by bundle name, compression, and the content
//! hash of each resource, so an unchanged bundle is copied from the cache
//! instead of being recompressed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::build::cache::{BuildCache, CacheEntry};
use crate::build::context::{BuildContext, BuildParameters, ContextObject};
use crate::build::layout::{bundle_path, LayoutError};
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::{BundleDetails, ResourceFile, ReturnCode};
use crate::build::write_data::WriteData;
use crate::content::ids::{Hash128, HashBuilder};

const ARCHIVE_STEP_VERSION: u32 = 1;

/// Directory below the temp folder receiving archives when no cache is used.
const ARCHIVE_DIRNAME: &str = "archives";

/// What the cache remembers about an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveRecord {
    checksum: u32,
    hash: Hash128,
    size: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveAndCompressBundles;

impl BuildStep for ArchiveAndCompressBundles {
    fn name(&self) -> &'static str {
        "archive-and-compress-bundles"
    }

    fn version(&self) -> u32 {
        ARCHIVE_STEP_VERSION
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::WriteData, ContextObject::Results]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let write = context.take_write_data()?;
        let outcome = self.archive_all(context, &write);
        context.set_write_data(write);
        outcome
    }
}

impl ArchiveAndCompressBundles {
    fn archive_all(&self, context: &mut BuildContext, write: &WriteData) -> Result<ReturnCode, BuildError> {
        let params = context.parameters().clone();
        let archiver = context.services().archiver.clone();
        let cache = context.cache();
        let dependencies = bundle_dependencies(write);
        let bundles = write.bundles();

        fs::create_dir_all(&params.output_folder)?;
        let mut all_cached = !bundles.is_empty();
        for (index, bundle) in bundles.iter().enumerate() {
            if !context.progress().update(self.name(), bundle, index, bundles.len()) {
                return Ok(ReturnCode::Canceled);
            }
            bundle_path(bundle)?;

            let resources = self.resources_of(context, write, bundle)?;
            let entry = self.cache_entry(bundle, &params, &resources)?;

            let cached = cache.as_deref().and_then(|cache| load_archive(cache, &entry, bundle));
            let (source, record) = match cached {
                Some(hit) => {
                    debug!(bundle = %bundle, "archive served from cache");
                    hit
                }
                None => {
                    all_cached = false;
                    let target = params
                        .temp_output_folder
                        .join(ARCHIVE_DIRNAME)
                        .join(Hash128::of_str(bundle).to_hex())
                        .join(archive_file_name(bundle));
                    let checksum = archiver.archive(&resources, &target, params.compression)?;
                    let bytes = fs::read(&target)?;
                    let record = ArchiveRecord { checksum, hash: Hash128::of(&bytes), size: bytes.len() as u64 };
                    if let Some(cache) = cache.as_deref() {
                        store(cache, &entry, &target, &record, bundle);
                    }
                    (target, record)
                }
            };

            let file_name = output_name(bundle, &record.hash, params.append_hash)?;
            let destination = params.output_folder.join(&file_name);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &destination)?;

            let details = BundleDetails {
                file_name: destination,
                hash: record.hash,
                checksum: record.checksum,
                size: record.size,
                dependencies: dependencies.get(*bundle).map(|set| set.iter().cloned().collect()).unwrap_or_default(),
            };
            context.results_mut().bundle_details.insert(bundle.to_string(), details);
        }

        info!(bundles = bundles.len(), output = %params.output_folder.display(), "bundles archived");
        Ok(if all_cached { ReturnCode::SuccessCached } else { ReturnCode::Success })
    }

    /// Resource files of every file in the bundle, in file order.
    fn resources_of(
        &self,
        context: &BuildContext,
        write: &WriteData,
        bundle: &str,
    ) -> Result<Vec<ResourceFile>, BuildError> {
        let results = context.results()?;
        let mut resources = Vec::new();
        for file in write.files_in_bundle(bundle) {
            let result = results
                .write_results
                .get(file)
                .ok_or_else(|| BuildError::Build(format!("no write result for {file} in bundle {bundle}")))?;
            resources.extend(result.resource_files.iter().cloned());
        }
        Ok(resources)
    }

    fn cache_entry(
        &self,
        bundle: &str,
        params: &BuildParameters,
        resources: &[ResourceFile],
    ) -> Result<CacheEntry, BuildError> {
        let mut builder = HashBuilder::new();
        builder.str(bundle).str(&params.compression.to_string());
        for resource in resources {
            let bytes = fs::read(&resource.path)?;
            builder.str(&resource.file_alias).hash(&Hash128::of(&bytes));
        }
        Ok(CacheEntry::file(Hash128::of_str(bundle), self.version(), &[builder.finish()]))
    }
}

/// A cached archive, if its record loads and the artifact is still there.
fn load_archive(cache: &BuildCache, entry: &CacheEntry, bundle: &str) -> Option<(PathBuf, ArchiveRecord)> {
    let info = cache.try_load::<ArchiveRecord>(entry)?;
    let path = cache.artifact_dir(entry).join(archive_file_name(bundle));
    path.exists().then_some((path, info.data))
}

/// Copy a fresh archive into the cache. Failures only cost the next build a
/// recompression.
fn store(cache: &BuildCache, entry: &CacheEntry, archive: &Path, record: &ArchiveRecord, bundle: &str) {
    match cache.store_artifacts(entry, &[archive.to_path_buf()]) {
        Ok(_) => {
            cache.try_save(entry, Vec::new(), record);
        }
        Err(err) => warn!(bundle = %bundle, error = %err, "failed to store archive in cache"),
    }
}

/// Bundle names may contain separators; artifacts keep only the last part.
fn archive_file_name(bundle: &str) -> String {
    Path::new(bundle)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| bundle.to_string())
}

/// Output path of a bundle, relative to the output folder. With `append_hash`
/// the archive hash is inserted before the extension. Names that would land
/// outside the output folder are rejected.
pub fn output_name(bundle: &str, hash: &Hash128, append_hash: bool) -> Result<PathBuf, LayoutError> {
    let path = bundle_path(bundle)?;
    if !append_hash {
        return Ok(path);
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, hash.to_hex(), ext.to_string_lossy()),
        None => format!("{}_{}", stem, hash.to_hex()),
    };
    Ok(path.with_file_name(name))
}

/// Bundles each bundle must load first: for every asset whose primary file
/// lives in the bundle, the bundles of its other files.
pub fn bundle_dependencies(write: &WriteData) -> BTreeMap<String, BTreeSet<String>> {
    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for files in write.asset_to_files.values() {
        let Some(own) = files.first().and_then(|file| write.file_to_bundle.get(file)) else {
            continue;
        };
        let entry = dependencies.entry(own.clone()).or_default();
        for bundle in files.iter().skip(1).filter_map(|file| write.file_to_bundle.get(file)) {
            if bundle != own {
                entry.insert(bundle.clone());
            }
        }
    }
    dependencies
}
