//! Build report publishing.

use tracing::info;

use crate::build::context::{BuildContext, ContextObject};
use crate::build::manifest::{BuildManifest, BuildMetadata};
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;

/// Writes the build manifest next to the published bundles. Step timings are
/// added by the caller once the whole pipeline has finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteBuildManifest;

impl BuildStep for WriteBuildManifest {
    fn name(&self) -> &'static str {
        "write-build-manifest"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::Results]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let params = context.parameters();
        let mut manifest = BuildManifest::from_results(context.results()?);
        manifest.set_metadata(BuildMetadata {
            builder_version: env!("CARGO_PKG_VERSION").to_string(),
            compression: params.compression.to_string(),
            append_hash: params.append_hash,
        });
        manifest.save_to_dir(&params.output_folder)?;
        info!(bundles = manifest.len(), output = %params.output_folder.display(), "build manifest written");
        Ok(ReturnCode::Success)
    }
}
