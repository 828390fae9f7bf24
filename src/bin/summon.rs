// EN: src/bin/summon.rs

use colored::*;
use std::env;
use std::path::PathBuf;
use summon::cli::{self, MainOptions};
use summon::constants::{ASSETS_ENV_VAR, DEFAULT_ASSETS_DIR};
use summon::system::executor::ExecutionError;

/// The main entry point of the `summon` executable.
/// It sets up logging, locates the asset directory, dispatches, and maps
/// failures to an exit code.
fn main() {
    env_logger::init();

    let assets_root = env::var_os(ASSETS_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
    log::debug!("Using assets from '{}'", assets_root.display());

    if let Err(e) = cli::run_main(env::args().collect(), &assets_root, MainOptions::default()) {
        // Mirror the exit status of a failed wrapped command.
        if let Some(code) = e
            .downcast_ref::<ExecutionError>()
            .and_then(ExecutionError::exit_code)
        {
            std::process::exit(code);
        }

        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
