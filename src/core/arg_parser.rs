// EN: src/core/arg_parser.rs

//! Flag definitions for the clap commands built at runtime, and the scan that
//! splits a raw command line into the tokens clap parses and the tokens that
//! pass through to the wrapped process.
//!
//! clap rejects flags it does not know, while summon forwards them. `scan`
//! walks the tokens against the same `Command` tree clap parses with, so both
//! agree on which tokens are flags, flag values and subcommand names. Every
//! other token is handed to the wrapped process exactly once.

use crate::models::FlagSpec;
use clap::{Arg, ArgAction, Command};
use std::collections::BTreeSet;

/// Flags summon itself understands, as opposed to flags declared in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFlag {
    /// `--json`: inline JSON template data.
    Json,
    /// `--json-file`: JSON template data read from a file, or stdin with `-`.
    JsonFile,
    /// `--dry-run` / `-n`.
    DryRun,
    /// `--debug` / `-d`.
    Debug,
    /// `--all` / `-a`: instantiate every asset.
    All,
    /// `--out` / `-o`: destination directory.
    Out,
    /// `--raw`: skip template rendering of assets.
    Raw,
    /// `--ls`: list assets.
    List,
    /// `--version` / `-v`.
    Version,
}

impl BuiltinFlag {
    /// Flags only the root command accepts.
    pub const ROOT_LOCAL: [Self; 5] = [Self::All, Self::Out, Self::Raw, Self::List, Self::Version];
    /// Flags the root hands down to every command.
    pub const ROOT_PERSISTENT: [Self; 3] = [Self::Json, Self::JsonFile, Self::Debug];

    /// The clap id, which is also the long name.
    pub fn id(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonFile => "json-file",
            Self::DryRun => "dry-run",
            Self::Debug => "debug",
            Self::All => "all",
            Self::Out => "out",
            Self::Raw => "raw",
            Self::List => "ls",
            Self::Version => "version",
        }
    }

    fn short(self) -> Option<char> {
        match self {
            Self::DryRun => Some('n'),
            Self::Debug => Some('d'),
            Self::All => Some('a'),
            Self::Out => Some('o'),
            Self::Version => Some('v'),
            Self::Json | Self::JsonFile | Self::Raw | Self::List => None,
        }
    }

    fn help(self) -> &'static str {
        match self {
            Self::Json => "json to use to render template",
            Self::JsonFile => "json file to use to render template, with '-' for stdin",
            Self::DryRun => "only show what would be executed",
            Self::Debug => "print debug info on stderr",
            Self::All => "restitute all data",
            Self::Out => "destination directory, or '-' for stdout",
            Self::Raw => "output without any template rendering",
            Self::List => "list all summonables",
            Self::Version => "output data version info and exit",
        }
    }

    /// True for `--json`, `--json-file` and `--out`.
    pub fn takes_value(self) -> bool {
        matches!(self, Self::Json | Self::JsonFile | Self::Out)
    }

    /// The clap argument for this flag.
    pub fn arg(self) -> Arg {
        let arg = Arg::new(self.id())
            .long(self.id())
            .short(self.short())
            .help(self.help());
        if self.takes_value() {
            arg.action(ArgAction::Set)
                .value_name("string")
                .allow_hyphen_values(true)
        } else {
            arg.action(ArgAction::SetTrue)
        }
    }
}

/// What a registered flag means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagKind {
    /// One of summon's own flags.
    Builtin(BuiltinFlag),
    /// A flag declared in the configuration.
    Declared(FlagSpec),
}

/// A clap argument together with its meaning for summon.
#[derive(Debug, Clone)]
pub struct FlagDef {
    /// The argument registered on the clap command. Its id is the long name.
    pub arg: Arg,
    /// Builtin or declared.
    pub kind: FlagKind,
}

impl FlagDef {
    pub fn builtin(flag: BuiltinFlag) -> Self {
        Self {
            arg: flag.arg(),
            kind: FlagKind::Builtin(flag),
        }
    }

    /// A config flag. One with a `default` never takes the next token: the
    /// default applies when it is given bare, and `--name=value` overrides it.
    pub fn declared(name: &str, spec: &FlagSpec) -> Self {
        let mut arg = Arg::new(name.to_string())
            .long(name.to_string())
            .short(spec.shorthand_char())
            .help(spec.help.clone().unwrap_or_default())
            .action(ArgAction::Set)
            .value_name("string")
            .allow_hyphen_values(true);
        if let Some(default) = &spec.default {
            arg = arg
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value(default.clone());
        }
        Self {
            arg,
            kind: FlagKind::Declared(spec.clone()),
        }
    }

    pub fn name(&self) -> &str {
        self.arg.get_id().as_str()
    }
}

/// A flag occurrence, resolved against the command that parsed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagHit {
    pub name: String,
    pub kind: FlagKind,
    /// The parsed value; `"true"` for a switch.
    pub value: String,
}

/// How `scan` classified one raw token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenClass {
    /// Names the subcommand the scan descended into.
    Subcommand,
    /// Sets these flags of the command `depth` levels below the root.
    Flags { ids: Vec<String>, depth: usize },
    /// The separate value of the flag before it.
    Value,
    /// `--help`, or `-h` when the current command does not claim it.
    Help,
    /// An unknown flag, a free positional, `--` or anything after it.
    PassThrough,
}

impl TokenClass {
    fn reaches_parser(&self) -> bool {
        matches!(self, Self::Subcommand | Self::Flags { .. } | Self::Value)
    }
}

/// The classification of a command line, one class per token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub classes: Vec<TokenClass>,
    /// Subcommands descended into, in order.
    pub path: Vec<String>,
}

impl Scan {
    /// Number of subcommands descended into before `index`.
    pub fn depth_at(&self, index: usize) -> usize {
        self.classes
            .iter()
            .take(index)
            .filter(|c| **c == TokenClass::Subcommand)
            .count()
    }

    /// Number of tokens before `index` that reach the wrapped process.
    pub fn pass_through_before(&self, index: usize) -> usize {
        self.classes
            .iter()
            .take(index)
            .filter(|c| !c.reaches_parser())
            .count()
    }

    /// The tokens clap parses: subcommand names, known flags and their values.
    pub fn parser_args(&self, tokens: &[String]) -> Vec<String> {
        self.select(tokens, true)
    }

    /// Recovers "everything meant for the downstream process", in order.
    /// Tokens after `--` are kept verbatim, the terminator included.
    pub fn extract_unknown_args(&self, tokens: &[String]) -> Vec<String> {
        self.select(tokens, false)
    }

    fn select(&self, tokens: &[String], parser: bool) -> Vec<String> {
        tokens
            .iter()
            .zip(&self.classes)
            .filter(|(_, class)| class.reaches_parser() == parser)
            .map(|(token, _)| token.clone())
            .collect()
    }
}

fn find_long<'a>(cmd: &'a Command, name: &str) -> Option<&'a Arg> {
    cmd.get_arguments().find(|a| a.get_long() == Some(name))
}

fn find_short(cmd: &Command, c: char) -> Option<&Arg> {
    cmd.get_arguments().find(|a| a.get_short() == Some(c))
}

// A value-taking flag without `require_equals` swallows the next token,
// whatever it looks like.
fn takes_next(arg: &Arg) -> bool {
    arg.get_action().takes_values() && !arg.is_require_equals_set()
}

fn scan_long(cmd: &Command, long: &str, depth: usize) -> (TokenClass, bool) {
    if long == "help" {
        return (TokenClass::Help, false);
    }
    let (name, inline) = match long.split_once('=') {
        Some((name, _)) => (name, true),
        None => (long, false),
    };
    match find_long(cmd, name) {
        Some(arg) => (
            TokenClass::Flags {
                ids: vec![arg.get_id().as_str().to_string()],
                depth,
            },
            !inline && takes_next(arg),
        ),
        None => (TokenClass::PassThrough, false),
    }
}

// Short flags may be bundled (`-abc`). A value-taking short swallows the
// rest of the bundle or the next token; one with an optional value only
// takes `=value` and lets the rest of the bundle be parsed as flags. A
// bundle with any unknown letter passes through as a whole.
fn scan_short(cmd: &Command, bundle: &str, depth: usize) -> (TokenClass, bool) {
    if bundle == "h" && find_short(cmd, 'h').is_none() {
        return (TokenClass::Help, false);
    }
    let mut ids = Vec::new();
    for (i, c) in bundle.char_indices() {
        let Some(arg) = find_short(cmd, c) else {
            return (TokenClass::PassThrough, false);
        };
        ids.push(arg.get_id().as_str().to_string());
        if !arg.get_action().takes_values() {
            continue;
        }
        let rest = bundle.get(i + c.len_utf8()..).unwrap_or("");
        if arg.is_require_equals_set() {
            if rest.starts_with('=') {
                return (TokenClass::Flags { ids, depth }, false);
            }
            continue;
        }
        return (TokenClass::Flags { ids, depth }, rest.is_empty());
    }
    (TokenClass::Flags { ids, depth }, false)
}

/// Classifies `tokens` (argv without the program name) against `root`.
///
/// Leading positionals naming a subcommand descend into it; the first one
/// that does not stops the descent. Flags are looked up on the current
/// command only, so a flag of a sibling or of the root's local set passes
/// through. A flag missing its value is still classified as a flag, which
/// leaves the error to clap.
pub fn scan(root: &Command, tokens: &[String]) -> Scan {
    let mut scan = Scan::default();
    let mut current = root;
    let mut descending = true;
    let mut i = 0;
    while let Some(token) = tokens.get(i) {
        if token == "--" {
            scan.classes
                .extend(tokens.iter().skip(i).map(|_| TokenClass::PassThrough));
            break;
        }
        let depth = scan.path.len();
        let (class, value_follows) = if let Some(long) = token.strip_prefix("--") {
            scan_long(current, long, depth)
        } else if let Some(bundle) = token.strip_prefix('-').filter(|b| !b.is_empty()) {
            scan_short(current, bundle, depth)
        } else {
            match current.find_subcommand(token) {
                Some(sub) if descending => {
                    current = sub;
                    scan.path.push(token.clone());
                    (TokenClass::Subcommand, false)
                }
                _ => {
                    descending = false;
                    (TokenClass::PassThrough, false)
                }
            }
        };
        scan.classes.push(class);
        i += 1;
        if value_follows && i < tokens.len() {
            scan.classes.push(TokenClass::Value);
            i += 1;
        }
    }
    log::trace!("Scanned {:?} as {:?}", tokens, scan.classes);
    scan
}

/// Returns, in original order, the arguments whose positions were not consumed by a template.
pub fn compute_unused(args: &[String], consumed: &BTreeSet<usize>) -> Vec<String> {
    args.iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .map(|(_, a)| a.clone())
        .collect()
}
