// EN: src/core/session.rs

//! Per-invocation state: options set by the command line, the positional
//! arguments consumed by templates, and the flags waiting to be rendered.
//!
//! A `Session` lives for one invocation. `run` template calls get a fresh
//! session (see `Session::fork`) so sibling and nested calls keep their own
//! bookkeeping.

use crate::models::{FlagSpec, SpecId};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while applying a `DriverOption`.
#[derive(Error, Debug)]
pub enum OptionError {
    /// `--json` text failed to parse.
    #[error("--json data is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// `--json` parsed to something other than an object.
    #[error("--json data must be a JSON object, found: {0}")]
    NotAnObject(String),
}

/// The options of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Handle path as typed (e.g. `manifest all`), used in messages.
    pub reference: String,
    /// Spec of the selected command node, when routing already resolved it.
    pub spec: Option<SpecId>,
    /// Positional tokens left after flag removal.
    pub args: Vec<String>,
    /// Template data.
    pub data: Map<String, Value>,
    /// Print the command instead of running it.
    pub dry_run: bool,
    /// Echo the command on stderr before running it.
    pub debug: bool,
    /// Copy assets without rendering them.
    pub raw: bool,
    /// Where summoned assets go. `-` means stdout.
    pub destination: Option<PathBuf>,
}

/// A functional option applied with `Options::apply`.
#[derive(Debug, Clone)]
pub enum DriverOption {
    /// Sets `Options::reference`.
    Ref(String),
    /// Sets `Options::spec`.
    Spec(SpecId),
    /// Sets `Options::args`.
    Args(Vec<String>),
    /// Raw JSON text, merged into the template data.
    Json(String),
    DryRun(bool),
    Debug(bool),
    Raw(bool),
    Dest(PathBuf),
}

impl Options {
    /// Applies one option. Only `Json` can fail.
    pub fn apply(&mut self, option: DriverOption) -> Result<(), OptionError> {
        match option {
            DriverOption::Ref(reference) => self.reference = reference,
            DriverOption::Spec(id) => self.spec = Some(id),
            DriverOption::Args(args) => self.args = args,
            DriverOption::Json(text) => match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => self.data.extend(map),
                other => return Err(OptionError::NotAnObject(other.to_string())),
            },
            DriverOption::DryRun(on) => self.dry_run = on,
            DriverOption::Debug(on) => self.debug = on,
            DriverOption::Raw(on) => self.raw = on,
            DriverOption::Dest(dir) => self.destination = Some(dir),
        }
        Ok(())
    }
}

/// The live binding of one flag for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagValue {
    pub name: String,
    /// Template rendered with the user value bound to `flag`.
    pub effect: String,
    /// The value given on the command line, or the flag's default.
    pub user_value: String,
    /// Memoized render of `effect`.
    pub rendered: Option<String>,
    /// Not auto-appended to the argv. Flipped on by `flagValue`.
    pub explicit: bool,
}

/// A help token handed to the wrapped command instead of answered by summon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpForward {
    /// The token as typed (`--help` or `-h`).
    pub token: String,
    /// How many pass-through arguments preceded it, which is where it goes
    /// back among the arguments no template consumed.
    pub position: usize,
}

/// Name of the synthetic flag carrying a forwarded help token.
pub const HELP_FLAG: &str = "help";

/// Bookkeeping of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub options: Options,
    /// Indices into `options.args` read by `arg(i)`, `args()` or `swallowargs()`.
    pub consumed: BTreeSet<usize>,
    /// Flags set on the command line, in first-seen order.
    pub flags_to_render: Vec<FlagValue>,
    /// A help token to hand to the wrapped command.
    pub help: Option<HelpForward>,
    /// Nesting level of `run` template calls.
    pub depth: usize,
    /// Handles traversed by `run` template calls, outermost first.
    pub chain: Vec<String>,
}

impl Session {
    /// A session for a nested `run` of `handle`. Template data and the
    /// dry-run/debug/raw switches carry over; consumption, flags and help do not.
    pub fn fork(&self, handle: &str) -> Self {
        let mut chain = self.chain.clone();
        if chain.is_empty() && !self.options.reference.is_empty() {
            chain.push(self.options.reference.clone());
        }
        chain.push(handle.to_string());
        Self {
            options: Options {
                reference: String::new(),
                spec: None,
                args: Vec::new(),
                ..self.options.clone()
            },
            consumed: BTreeSet::new(),
            flags_to_render: Vec::new(),
            help: None,
            depth: self.depth + 1,
            chain,
        }
    }

    /// Records a flag occurrence. A flag keeps the position of its first
    /// occurrence; a repeated flag only updates its value.
    pub fn set_flag(&mut self, name: &str, spec: &FlagSpec, value: &str) {
        match self.flags_to_render.iter_mut().find(|f| f.name == name) {
            Some(existing) => {
                existing.user_value = value.to_string();
                existing.rendered = None;
            }
            None => self.flags_to_render.push(FlagValue {
                name: name.to_string(),
                effect: spec.effect.clone(),
                user_value: value.to_string(),
                rendered: None,
                explicit: spec.explicit,
            }),
        }
    }

    /// Records a forwarded help token as an explicit synthetic flag.
    pub fn forward_help(&mut self, help: HelpForward) {
        let spec = FlagSpec {
            effect: help.token.clone(),
            explicit: true,
            ..Default::default()
        };
        self.set_flag(HELP_FLAG, &spec, &help.token);
        self.help = Some(help);
    }

    pub fn consume(&mut self, index: usize) {
        self.consumed.insert(index);
    }

    /// Marks every argument consumed.
    pub fn consume_all(&mut self) {
        self.consumed.extend(0..self.options.args.len());
    }

    /// True when the forwarded help token was placed by a template via `flagValue("help")`.
    pub fn help_referenced(&self) -> bool {
        self.help.is_some()
            && self
                .flags_to_render
                .iter()
                .any(|f| f.name == HELP_FLAG && f.rendered.is_some())
    }
}
