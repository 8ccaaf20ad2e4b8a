//! Build command implementations (build, clean)

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use crate::build::{Build, BuildCache, BuildProgress, ConsoleProgress, JsonProgress, ProgressReporter};
use crate::config::{resolve_path, CliOverrides};

use super::{load_project, EXIT_ERROR, EXIT_SUCCESS};

/// Run the build command
pub fn run_build(config_path: Option<&Path>, overrides: &CliOverrides, json: bool, verbose: bool) -> ExitCode {
    let (config, project_root) = match load_project(config_path, overrides, verbose) {
        Ok(project) => project,
        Err(code) => return code,
    };

    let reporter: Arc<dyn ProgressReporter> = if json {
        Arc::new(JsonProgress::new())
    } else {
        Arc::new(ConsoleProgress::new().with_verbose(verbose))
    };

    let outcome = match Build::new(config, project_root).progress(BuildProgress::new(reporter)).run() {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Build error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Some(stats) = &outcome.cache_stats {
        if verbose {
            println!("Cache: {} hits, {} misses, {} saved", stats.hits, stats.misses, stats.saves);
        }
    }

    if outcome.report.is_success() {
        let bundles = outcome.results.as_ref().map_or(0, |results| results.bundle_details.len());
        println!("{}", outcome.report.summary());
        println!("{} bundle(s) written", bundles);
        ExitCode::from(EXIT_SUCCESS)
    } else {
        eprintln!("{}", outcome.report.summary());
        ExitCode::from(EXIT_ERROR)
    }
}

/// Run the clean command: purge the build cache and the temp folder.
pub fn run_clean(config_path: Option<&Path>, verbose: bool) -> ExitCode {
    let (config, project_root) = match load_project(config_path, &CliOverrides::default(), verbose) {
        Ok(project) => project,
        Err(code) => return code,
    };

    let cache_dir = resolve_path(&project_root, &config.build.cache_dir);
    if let Err(e) = BuildCache::new(&cache_dir).purge() {
        eprintln!("Error: failed to purge cache {}: {}", cache_dir.display(), e);
        return ExitCode::from(EXIT_ERROR);
    }

    let temp_dir = resolve_path(&project_root, &config.project.temp);
    if temp_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&temp_dir) {
            eprintln!("Error: failed to remove {}: {}", temp_dir.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    }

    println!("Removed {} and {}", cache_dir.display(), temp_dir.display());
    ExitCode::from(EXIT_SUCCESS)
}
