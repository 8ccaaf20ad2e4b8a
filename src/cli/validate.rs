//! Validate command implementation

use std::path::Path;
use std::process::ExitCode;

use crate::build::steps::validate::ValidateBundleLayout;
use crate::build::{Build, BuildPipeline};
use crate::config::CliOverrides;

use super::{load_project, EXIT_ERROR, EXIT_SUCCESS};

/// Check the configuration, the content database, and the bundle layout.
pub fn run_validate(config_path: Option<&Path>, overrides: &CliOverrides, verbose: bool) -> ExitCode {
    let (config, project_root) = match load_project(config_path, overrides, verbose) {
        Ok(project) => project,
        Err(code) => return code,
    };

    let mut context = match Build::new(config, project_root).context() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let report = BuildPipeline::new().with_step(ValidateBundleLayout).run(&mut context);
    if !report.is_success() {
        eprintln!("{}", report.summary());
        return ExitCode::from(EXIT_ERROR);
    }

    let content = context.content();
    match context.layout() {
        Some(layout) => {
            println!("OK: {} bundles, {} assets, {} scenes", layout.len(), content.assets.len(), content.scenes.len())
        }
        None => println!("OK: {} assets, {} scenes (automatic layout)", content.assets.len(), content.scenes.len()),
    }
    ExitCode::from(EXIT_SUCCESS)
}
