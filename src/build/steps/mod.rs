//! Steps of the default bundle pipeline.
//!
//! Run in this order:
//!
//! 1. [`clean_state::ProjectInCleanState`]
//! 2. [`validate::ValidateBundleLayout`]
//! 3. [`dependency::CalculateSceneDependencyData`]
//! 4. [`dependency::CalculateAssetDependencyData`]
//! 5. [`callbacks::PostDependencyCallback`]
//! 6. [`builtin::CreateBuiltInResourcesBundle`]
//! 7. [`packing::GenerateBundlePacking`]
//! 8. [`auto_packing::AutoBundlePacking`]
//! 9. [`object_layout::UpdateBundleObjectLayout`]
//! 10. [`callbacks::PostPackingCallback`]
//! 11. [`commands::GenerateBundleCommands`]
//! 12. [`commands::GenerateBundleMaps`]
//! 13. [`write::WriteSerializedFiles`]
//! 14. [`callbacks::PostWritingCallback`]
//! 15. [`archive::ArchiveAndCompressBundles`]
//! 16. [`report::WriteBuildManifest`]

pub mod archive;
pub mod auto_packing;
pub mod builtin;
pub mod callbacks;
pub mod clean_state;
pub mod commands;
pub mod dependency;
pub mod object_layout;
pub mod packing;
pub mod report;
pub mod validate;
pub mod write;

use super::pipeline::BuildStep;

/// The default step list.
pub fn default_steps() -> Vec<Box<dyn BuildStep>> {
    vec![
        Box::new(clean_state::ProjectInCleanState),
        Box::new(validate::ValidateBundleLayout),
        Box::new(dependency::CalculateSceneDependencyData),
        Box::new(dependency::CalculateAssetDependencyData),
        Box::new(callbacks::PostDependencyCallback),
        Box::new(builtin::CreateBuiltInResourcesBundle),
        Box::new(packing::GenerateBundlePacking),
        Box::new(auto_packing::AutoBundlePacking),
        Box::new(object_layout::UpdateBundleObjectLayout),
        Box::new(callbacks::PostPackingCallback),
        Box::new(commands::GenerateBundleCommands),
        Box::new(commands::GenerateBundleMaps),
        Box::new(write::WriteSerializedFiles),
        Box::new(callbacks::PostWritingCallback),
        Box::new(archive::ArchiveAndCompressBundles),
        Box::new(report::WriteBuildManifest),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Small fixtures shared by the step tests.

    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::build::context::{BuildContent, BuildContext, BuildParameters, BuildServices};
    use crate::content::database::{ContentDatabase, ContentManifest};
    use crate::content::service::ContentService;

    /// Context over `manifest` with every asset and scene in the build,
    /// writing below a fresh temp dir.
    pub fn context_for(manifest: ContentManifest) -> (TempDir, BuildContext) {
        let temp = TempDir::new().unwrap();
        let db = ContentDatabase::from_manifest(manifest).unwrap();
        let content = BuildContent::from_assets(db.asset_ids(), &db);
        let params = BuildParameters::new(temp.path().join("out"), temp.path().join("tmp"));
        let services = BuildServices::new(Arc::new(db) as Arc<dyn ContentService>);
        (temp, BuildContext::new(params, content, services))
    }
}
