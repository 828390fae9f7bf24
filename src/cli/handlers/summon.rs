// EN: src/cli/handlers/summon.rs

use crate::cli::dispatcher::RootFlags;
use crate::constants::DEFAULT_OUTPUT_DIR;
use crate::core::driver::Driver;
use crate::system::assets::{Destination, SummonRequest, Target};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;

/// Instantiates one asset (or all of them with `--all`) into the destination
/// and prints where it landed.
pub fn handle(driver: &Driver, flags: &RootFlags, args: &[String], out: &mut dyn Write) -> Result<()> {
    let target = match (flags.all, args.first()) {
        (true, _) => Target::All,
        (false, Some(name)) => Target::Path(name.clone()),
        (false, None) => bail!("Nothing to summon: give an asset name or use --all"),
    };

    let options = driver.options();
    let destination = options
        .destination
        .map(|dir| Destination::parse(&dir.to_string_lossy()))
        .unwrap_or_else(|| Destination::Dir(PathBuf::from(DEFAULT_OUTPUT_DIR)));
    let request = SummonRequest {
        target,
        destination,
        raw: options.raw,
    };
    log::debug!("Summoning {:?}", request);

    let path = driver
        .summon(&request, out)
        .with_context(|| format!("Failed to summon '{}'", args.first().map_or("*", String::as_str)))?;
    if !path.is_empty() {
        if options.debug {
            eprintln!("{} {}", "Summoned".green(), path);
        }
        writeln!(out, "{path}")?;
    }
    Ok(())
}
