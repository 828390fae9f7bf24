// EN: src/cli/dispatcher.rs

use crate::cli::MainOptions;
use crate::cli::handlers;
use crate::constants::{COMPLETE_COMMAND_NAME, DEFAULT_OUTPUT_DIR};
use crate::core::arg_parser::{BuiltinFlag, FlagHit, FlagKind};
use crate::core::command_tree::{CommandTree, NodeId, NodeKind};
use crate::core::driver::Driver;
use crate::core::help_router::{self, HelpDecision};
use crate::core::session::DriverOption;
use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use std::path::PathBuf;

/// Defines a hidden system command and its handler.
struct CommandDefinition {
    name: &'static str,
    handler: fn(&Driver, &CommandTree, &[String], &mut dyn Write) -> Result<()>,
}

/// System commands answered before routing through the command tree.
static COMMAND_REGISTRY: &[CommandDefinition] = &[CommandDefinition {
    name: COMPLETE_COMMAND_NAME,
    handler: handlers::complete::handle,
}];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY.iter().find(|cmd| cmd.name == name)
}

/// Values of the built-in flags found while routing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RootFlags {
    pub json: Option<String>,
    pub json_file: Option<String>,
    pub dry_run: bool,
    pub debug: bool,
    pub all: bool,
    pub out: Option<String>,
    pub raw: bool,
    pub list: bool,
    pub version: bool,
}

/// Collects built-in flags and binds declared ones to the driver.
pub fn apply_flags(driver: &Driver, hits: &[FlagHit]) -> Result<RootFlags> {
    let mut flags = RootFlags::default();
    for hit in hits {
        let builtin = match &hit.kind {
            FlagKind::Declared(spec) => {
                driver.set_flag(&hit.name, spec, &hit.value);
                continue;
            }
            FlagKind::Builtin(builtin) => builtin,
        };
        let on = hit.value != "false";
        match builtin {
            BuiltinFlag::Json => flags.json = Some(hit.value.clone()),
            BuiltinFlag::JsonFile => flags.json_file = Some(hit.value.clone()),
            BuiltinFlag::DryRun => flags.dry_run = on,
            BuiltinFlag::Debug => flags.debug = on,
            BuiltinFlag::All => flags.all = on,
            BuiltinFlag::Out => flags.out = Some(hit.value.clone()),
            BuiltinFlag::Raw => flags.raw = on,
            BuiltinFlag::List => flags.list = on,
            BuiltinFlag::Version => flags.version = on,
        }
    }
    if flags.json.is_some() && flags.json_file.is_some() {
        bail!("--json and --json-file are mutually exclusive");
    }
    Ok(flags)
}

fn read_json_file(path: &str) -> Result<String> {
    if path == "-" {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read JSON data from stdin");
    }
    let expanded = shellexpand::tilde(path);
    std::fs::read_to_string(expanded.as_ref())
        .with_context(|| format!("Failed to read JSON file '{path}'"))
}

/// Pushes the invocation-wide switches into the driver.
fn configure_driver(driver: &Driver, flags: &RootFlags) -> Result<()> {
    let mut options = vec![
        DriverOption::DryRun(flags.dry_run),
        DriverOption::Debug(flags.debug),
        DriverOption::Raw(flags.raw),
    ];
    if let Some(json) = &flags.json {
        options.push(DriverOption::Json(json.clone()));
    }
    if let Some(path) = &flags.json_file {
        options.push(DriverOption::Json(read_json_file(path)?));
    }

    let out = flags
        .out
        .clone()
        .or_else(|| driver.config().outputdir.clone())
        .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
    let dest = if out == "-" {
        out
    } else {
        shellexpand::tilde(&out).into_owned()
    };
    options.push(DriverOption::Dest(PathBuf::from(dest)));

    driver.configure(options)?;
    Ok(())
}

/// Writes the help screen of `node`.
pub fn print_help(driver: &Driver, tree: &CommandTree, node: NodeId, out: &mut dyn Write) -> Result<()> {
    let assets = if node == tree.root() && !driver.config().hide_assets_in_help {
        driver.assets().list()?
    } else {
        Vec::new()
    };
    let mut cmd = tree.clap_command(node, &assets);
    let help = cmd.render_help();
    if colored::control::SHOULD_COLORIZE.should_colorize() {
        write!(out, "{}", help.ansi())?;
    } else {
        write!(out, "{help}")?;
    }
    Ok(())
}

/// Routes `tokens` (argv without the program name) and runs the selected action.
pub fn dispatch(
    driver: &Driver,
    program: &str,
    tokens: &[String],
    options: &MainOptions,
    out: &mut dyn Write,
) -> Result<()> {
    log::debug!("Dispatching args: {:?}", tokens);
    let tree = CommandTree::build(driver.graph(), program, options.without_run_subcmd);

    if let Some(command) = tokens.first().and_then(|first| find_command(first)) {
        return (command.handler)(driver, &tree, tokens.get(1..).unwrap_or_default(), out);
    }

    let tokens = match help_router::decide(&tree, tokens) {
        HelpDecision::None => tokens.to_vec(),
        HelpDecision::Own(node) => return print_help(driver, &tree, node, out),
        HelpDecision::Forward { tokens, help } => {
            driver.forward_help(help);
            tokens
        }
    };

    let routed = tree.route(&tokens)?;
    let flags = apply_flags(driver, &routed.flags)?;
    configure_driver(driver, &flags)?;

    let kind = tree
        .node(routed.node)
        .map(|n| n.kind)
        .ok_or_else(|| anyhow!("Routing selected an unknown command node"))?;
    match kind {
        NodeKind::Spec(_) => handlers::run::handle(driver, &tree, &routed),
        NodeKind::RunGroup => match routed.args.first() {
            None => bail!("requires at least 1 command to run, received 0"),
            Some(arg) => bail!(
                "invalid argument {:?} for {:?}",
                arg,
                format!("{program} {}", tree.path(routed.node).join(" "))
            ),
        },
        NodeKind::Root => {
            if flags.version {
                handlers::version::handle(driver, program, out)
            } else if flags.list {
                handlers::list::handle(driver, out)
            } else if flags.all || !routed.args.is_empty() {
                handlers::summon::handle(driver, &flags, &routed.args, out)
            } else {
                print_help(driver, &tree, tree.root(), out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config_loader;
    use crate::system::assets::AssetStore;
    use crate::system::executor::RecordingRunner;
    use crate::system::prompter::ScriptedPrompter;
    use std::sync::Arc;

    const CONFIG: &str = r#"
exec:
  flags:
    global: 'GLOBAL={{ flag }}'
  handles:
    tool:
      cmd: [tool]
      flags:
        one: 'one={{ flag }}'
"#;

    fn driver() -> Driver {
        let loaded = config_loader::parse(CONFIG, "test.yaml").unwrap();
        Driver::new(
            loaded,
            AssetStore::default(),
            Arc::new(RecordingRunner::new()),
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        )
        .unwrap()
    }

    fn route_flags(driver: &Driver, tokens: &[&str]) -> Result<RootFlags> {
        let tree = CommandTree::build(driver.graph(), "summon", false);
        let tokens: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        let routed = tree.route(&tokens)?;
        apply_flags(driver, &routed.flags)
    }

    #[test]
    fn test_builtin_flags_are_collected() {
        let driver = driver();
        let flags = route_flags(&driver, &["-a", "--out", "-", "--raw"]).unwrap();
        assert!(flags.all);
        assert!(flags.raw);
        assert_eq!(flags.out.as_deref(), Some("-"));
    }

    #[test]
    fn test_json_and_json_file_are_exclusive() {
        let driver = driver();
        let err = route_flags(&driver, &["--json", "{}", "--json-file", "x.json"]).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_declared_flags_are_bound_to_the_driver() {
        let driver = driver();
        let flags = route_flags(&driver, &["run", "tool", "--one", "1", "--global", "g"]).unwrap();
        assert_eq!(flags, RootFlags::default());

        driver
            .configure([DriverOption::Ref("tool".to_string())])
            .unwrap();
        let built = driver.build_command().unwrap();
        assert_eq!(built.argv, vec!["tool", "one=1", "GLOBAL=g"]);
    }

    #[test]
    fn test_registry_lookup() {
        assert!(find_command(COMPLETE_COMMAND_NAME).is_some());
        assert!(find_command("run").is_none());
    }
}
