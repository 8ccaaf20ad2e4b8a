//! Automatic packing when no explicit layout is given.
//!
//! Every packable object goes to the file identified by the exact set of
//! assets and scenes that use it. An object with a single user lands in that
//! user's own file; objects sharing a user set of two or more collapse into
//! one `SHARED-<hash>` bundle.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::build::context::{BuildContent, BuildContext, ContextObject};
use crate::build::dependency_data::DependencyData;
use crate::build::filter::ReferenceFilter;
use crate::build::identifiers::DeterministicIdentifiers;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;
use crate::build::steps::packing::SHARED_ASSETS_SUFFIX;
use crate::build::write_data::{internal_file_name, SceneWriteInfo, WriteData};
use crate::content::ids::{AssetId, Hash128, ObjectId};
use crate::content::service::ContentService;

/// Prefix of automatically generated shared bundles.
pub const SHARED_BUNDLE_PREFIX: &str = "SHARED-";

/// Name of the shared bundle for a set of users.
pub fn shared_bundle_name(users: &BTreeSet<AssetId>) -> String {
    let hashes: Vec<Hash128> = users.iter().map(AssetId::hash).collect();
    format!("{}{}", SHARED_BUNDLE_PREFIX, Hash128::combine(&hashes).to_hex())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoBundlePacking;

impl BuildStep for AutoBundlePacking {
    fn name(&self) -> &'static str {
        "auto-bundle-packing"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        if context.layout().is_some() {
            return Ok(ReturnCode::SuccessNotRun);
        }
        let services = context.services();
        let packer = AutoPacker {
            content: services.content.as_ref(),
            identifiers: services.identifiers.as_ref(),
        };
        let write_data = packer.pack(context.content(), context.dependency_data()?)?;
        debug!(
            files = write_data.file_to_objects.len(),
            bundles = write_data.bundles().len(),
            "automatic layout packed"
        );
        context.set_write_data(write_data);
        Ok(ReturnCode::Success)
    }
}

/// Content-defined packer.
pub struct AutoPacker<'a> {
    pub content: &'a dyn ContentService,
    pub identifiers: &'a dyn DeterministicIdentifiers,
}

impl AutoPacker<'_> {
    /// Bundle name of an asset's own file: its address, else its path.
    fn bundle_name(&self, build: &BuildContent, asset: &AssetId) -> Result<String, BuildError> {
        match build.addresses.get(asset) {
            Some(address) => Ok(address.clone()),
            None => Ok(self.content.asset_path(asset)?),
        }
    }

    fn file_for(&self, bundle: &str) -> String {
        internal_file_name(&self.identifiers.generate_internal_file_name(bundle))
    }

    pub fn pack(&self, build: &BuildContent, data: &DependencyData) -> Result<WriteData, BuildError> {
        let mut users: BTreeMap<&ObjectId, BTreeSet<AssetId>> = BTreeMap::new();
        for info in data.asset_info.values() {
            for object in info.included_objects.iter().chain(&info.referenced_objects) {
                if ReferenceFilter::is_packable(object) {
                    users.entry(object).or_default().insert(info.asset);
                }
            }
        }
        for info in data.scene_info.values() {
            for object in info.referenced_objects.iter().filter(|o| ReferenceFilter::is_packable(o)) {
                users.entry(object).or_default().insert(info.scene);
            }
        }

        let mut write = WriteData::new();
        let mut home: BTreeMap<AssetId, String> = BTreeMap::new();

        for asset in data.asset_info.keys() {
            let bundle = self.bundle_name(build, asset)?;
            let file = self.file_for(&bundle);
            write.add_file(&file, &bundle);
            write.add_asset_file(*asset, &file);
            home.insert(*asset, file);
        }
        for (scene, info) in &data.scene_info {
            let bundle = self.bundle_name(build, scene)?;
            let file = self.file_for(&self.content.asset_path(scene)?);
            let shared = format!("{}{}", file, SHARED_ASSETS_SUFFIX);
            write.add_file(&file, &bundle);
            write.add_file(&shared, &bundle);
            write.scene_files.insert(
                file.clone(),
                SceneWriteInfo { scene: *scene, processed_scene: info.processed_scene.clone() },
            );
            write.add_asset_file(*scene, &file);
            write.add_asset_file(*scene, &shared);
            home.insert(*scene, shared);
        }

        let mut dependencies: BTreeMap<AssetId, BTreeSet<String>> = BTreeMap::new();
        for (object, set) in users {
            let file = match set.iter().next() {
                Some(only) if set.len() == 1 => home.get(only).cloned().unwrap_or_default(),
                _ => {
                    let bundle = shared_bundle_name(&set);
                    let file = self.file_for(&bundle);
                    write.add_file(&file, &bundle);
                    file
                }
            };
            write.add_object(&file, object.clone());
            for user in set {
                dependencies.entry(user).or_default().insert(file.clone());
            }
        }

        for (asset, files) in dependencies {
            for file in files {
                write.add_asset_file(asset, &file);
            }
        }
        Ok(write)
    }
}
