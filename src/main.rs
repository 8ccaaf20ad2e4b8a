//! Bundlesmith - command-line bundle builder

use std::process::ExitCode;

use bundlesmith::cli;

fn main() -> ExitCode {
    cli::run()
}
