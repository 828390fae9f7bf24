// EN: src/cli/handlers/version.rs

use crate::core::driver::Driver;
use anyhow::Result;
use serde_json::json;
use std::io::Write;

/// Prints the executable and asset configuration versions as JSON.
pub fn handle(driver: &Driver, program: &str, out: &mut dyn Write) -> Result<()> {
    let info = json!({
        "program": program,
        "lib": {
            "name": clap::crate_name!(),
            "version": clap::crate_version!(),
        },
        "assets": {
            "config": driver.origin(),
            "version": driver.config().version,
        },
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
    Ok(())
}
