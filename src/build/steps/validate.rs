//! Fail-fast validation of an explicit layout.

use tracing::debug;

use crate::build::context::BuildContext;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;

/// Rejects layouts with empty, mixed, or overlapping bundles, and layouts
/// naming assets the content service does not know, before any dependency
/// work happens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateBundleLayout;

impl BuildStep for ValidateBundleLayout {
    fn name(&self) -> &'static str {
        "validate-bundle-layout"
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(layout) = context.layout() else {
            return Ok(ReturnCode::SuccessNotRun);
        };
        let content = context.services().content.as_ref();

        for (_, assets) in layout.iter() {
            for asset in assets {
                content.asset_path(asset)?;
            }
        }
        let kinds = layout.validate(content)?;
        debug!(bundles = kinds.len(), "layout is valid");
        Ok(ReturnCode::Success)
    }
}
