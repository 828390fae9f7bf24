// EN: src/cli/handlers/run.rs

use crate::core::command_tree::{CommandTree, NodeKind, Routed};
use crate::core::driver::Driver;
use crate::core::session::DriverOption;
use anyhow::{Result, bail};

///
/// Main entry point for a handle invocation.
/// Binds the routed handle and its positional arguments to the driver, then
/// builds and runs the wrapped command.
///
pub fn handle(driver: &Driver, tree: &CommandTree, routed: &Routed) -> Result<()> {
    let reference = tree.reference(routed.node);
    let Some(NodeKind::Spec(id)) = tree.node(routed.node).map(|n| n.kind) else {
        bail!("'{}' is not a runnable handle", reference);
    };
    log::debug!("Running '{}' with args {:?}", reference, routed.args);

    driver.configure([
        DriverOption::Ref(reference),
        DriverOption::Spec(id),
        DriverOption::Args(routed.args.clone()),
    ])?;
    driver.run()
}
