// EN: src/cli/handlers/list.rs

use crate::core::driver::Driver;
use anyhow::Result;
use std::io::Write;

/// Prints every summonable asset, one per line.
pub fn handle(driver: &Driver, out: &mut dyn Write) -> Result<()> {
    for name in driver.assets().list()? {
        writeln!(out, "{name}")?;
    }
    Ok(())
}
