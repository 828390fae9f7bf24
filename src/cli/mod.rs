// EN: src/cli/mod.rs

//! Command-line surface of summon.
//!
//! Raw process arguments go straight to the dispatcher: the command tree is
//! built from the asset configuration at runtime, so there is no static clap
//! parser in front of it. clap renders the help screens.

pub mod dispatcher;
pub mod handlers;

use crate::constants::DEFAULT_PROGRAM_NAME;
use crate::core::config_loader;
use crate::core::driver::Driver;
use crate::system::assets::AssetStore;
use crate::system::executor::SystemRunner;
use crate::system::prompter::TerminalPrompter;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Build-time switches of the command surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainOptions {
    /// Hang handles directly from the root instead of under `run`.
    pub without_run_subcmd: bool,
}

/// Entry point used by the binary: loads the configuration found in
/// `assets_root` and dispatches `args` (argv, program name included).
pub fn run_main(args: Vec<String>, assets_root: &Path, options: MainOptions) -> Result<()> {
    let program = args
        .first()
        .and_then(|a| Path::new(a).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());

    let loaded = config_loader::load_from_dir(assets_root)
        .with_context(|| format!("Failed to load the configuration of '{}'", assets_root.display()))?;
    let driver = Driver::new(
        loaded,
        AssetStore::new(assets_root),
        Arc::new(SystemRunner),
        Arc::new(TerminalPrompter),
    )?;

    let tokens = args.get(1..).unwrap_or_default();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    dispatcher::dispatch(&driver, &program, tokens, &options, &mut out)
}
