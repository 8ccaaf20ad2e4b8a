//! Pre-flight check that the project has no unsaved modifications.

use tracing::warn;

use crate::build::context::BuildContext;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectInCleanState;

impl BuildStep for ProjectInCleanState {
    fn name(&self) -> &'static str {
        "project-in-clean-state"
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        if context.services().content.has_unsaved_changes() {
            warn!("project has unsaved changes, save before building");
            context.progress().warn(self.name(), "project has unsaved changes");
            return Ok(ReturnCode::UnsavedChanges);
        }
        Ok(ReturnCode::Success)
    }
}
