//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod report;
mod validate;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{find_config, load_config, merge_cli_overrides, BundleConfig, CliOverrides, Compression};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Bundlesmith - deterministic content bundle builder
#[derive(Parser)]
#[command(name = "bsmith")]
#[command(about = "Bundlesmith - build deterministic, cache-accelerated content bundles")]
#[command(version)]
pub struct Cli {
    /// Path to bundle.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug logs and per-item progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build all bundles of the project
    Build {
        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Content database file (overrides config)
        #[arg(long)]
        content: Option<PathBuf>,

        /// Archive compression: none or lz4 (overrides config)
        #[arg(long)]
        compression: Option<Compression>,

        /// Ignore and do not update the build cache
        #[arg(long)]
        no_cache: bool,

        /// Append the archive hash to bundle file names
        #[arg(long)]
        append_hash: bool,

        /// Emit progress as JSON lines on stderr
        #[arg(long)]
        json: bool,
    },

    /// Check the configuration and bundle layout without building
    Validate {
        /// Content database file (overrides config)
        #[arg(long)]
        content: Option<PathBuf>,
    },

    /// Remove the build cache and temporary files
    Clean,

    /// Print the report of the last build
    Report {
        /// Output directory holding the report (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Re-check every bundle against its recorded checksum
        #[arg(long)]
        verify: bool,

        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },
}

static TRACING: Once = Once::new();

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    TRACING.call_once(|| {
        let default = if verbose { "bundlesmith=debug" } else { "bundlesmith=warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}

/// Load the project configuration and its root directory, applying overrides.
pub(crate) fn load_project(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> Result<(BundleConfig, PathBuf), ExitCode> {
    let found = config_path.map(Path::to_path_buf).or_else(find_config);
    let root = match &found {
        Some(path) => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        None => std::env::current_dir().unwrap_or_default(),
    };
    if verbose {
        match &found {
            Some(path) => println!("Using config: {}", path.display()),
            None => println!("No bundle.toml found, using defaults"),
        }
    }

    let mut config = match load_config(found.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return Err(ExitCode::from(EXIT_ERROR));
        }
    };
    merge_cli_overrides(&mut config, overrides);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("Error: {}", error);
        }
        return Err(ExitCode::from(EXIT_INVALID_ARGS));
    }
    Ok((config, root))
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Build { out, content, compression, no_cache, append_hash, json } => {
            let overrides = CliOverrides {
                out,
                content,
                compression,
                use_cache: no_cache.then_some(false),
                append_hash: append_hash.then_some(true),
                ..Default::default()
            };
            build::run_build(config, &overrides, json, cli.verbose)
        }
        Commands::Validate { content } => {
            let overrides = CliOverrides { content, ..Default::default() };
            validate::run_validate(config, &overrides, cli.verbose)
        }
        Commands::Clean => build::run_clean(config, cli.verbose),
        Commands::Report { out, verify, json } => {
            let overrides = CliOverrides { out, ..Default::default() };
            report::run_report(config, &overrides, verify, json, cli.verbose)
        }
    }
}
