//! Report command implementation

use std::path::Path;
use std::process::ExitCode;

use crate::build::manifest::BuildManifest;
use crate::config::{resolve_path, CliOverrides};

use super::{load_project, EXIT_ERROR, EXIT_SUCCESS};

/// Print the report left by the last build, optionally re-checking outputs.
pub fn run_report(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verify: bool,
    json: bool,
    verbose: bool,
) -> ExitCode {
    let (config, project_root) = match load_project(config_path, overrides, verbose) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let out_dir = resolve_path(&project_root, &config.project.out);

    let manifest = match BuildManifest::load_from_dir(&out_dir) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => {
            eprintln!("Error: no build report in {}", out_dir.display());
            eprintln!("Run 'bsmith build' first");
            return ExitCode::from(EXIT_ERROR);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if json {
        match serde_json::to_string_pretty(&manifest) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        println!("Build {} at {}", manifest.code, manifest.created_at);
        for (name, bundle) in &manifest.bundles {
            println!("  {} ({} bytes, {})", name, bundle.size, bundle.hash);
            if verbose {
                for dependency in &bundle.dependencies {
                    println!("    needs {}", dependency);
                }
            }
        }
        if let Some(stats) = &manifest.stats {
            println!("{} bundles, {} total", stats.bundle_count, stats.size_string());
        }
    }

    if !verify {
        return ExitCode::from(EXIT_SUCCESS);
    }
    match manifest.verify_outputs() {
        Ok(changed) if changed.is_empty() => {
            println!("All {} bundles match the report", manifest.len());
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(changed) => {
            for name in &changed {
                eprintln!("Changed or missing: {}", name);
            }
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
