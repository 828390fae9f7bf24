// EN: src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- `summon.config.yaml` MODELS (What is read from the configuration file) ---

/// Represents the deserialized structure of a `summon.config.yaml` file.
///
/// The `exec` section is kept as a raw YAML value: its descriptors are
/// polymorphic and are decoded by the config loader, which inspects the node
/// kind before choosing a shape.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// Schema version, informational only.
    #[serde(default)]
    pub version: Option<u32>,
    /// Shortcuts from a user-facing name to a path inside the assets.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Where summoned files land when `--out` is not given.
    #[serde(default)]
    pub outputdir: Option<String>,
    /// Shared template source, evaluated once and importable as `summon`.
    #[serde(default, rename = "templates")]
    pub template_context: String,
    /// Keeps the asset listing out of the root help screen.
    #[serde(default, rename = "hideAssetsInHelp")]
    pub hide_assets_in_help: bool,
    /// The invocation section (`flags`, `handles` and invoker-first entries).
    #[serde(default)]
    pub exec: serde_yaml::Value,
}

/// A single element of an argument-list spec: a string, or a nested list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgItem {
    /// A template string, rendered into zero or more argv entries.
    Text(String),
    /// A nested list, flattened in place.
    List(Vec<ArgItem>),
}

impl ArgItem {
    /// Flattens a list of items into the plain template strings, in order.
    pub fn flatten(items: &[ArgItem]) -> Vec<String> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArgItem::Text(s) => out.push(s.clone()),
                ArgItem::List(nested) => out.extend(Self::flatten(nested)),
            }
        }
        out
    }
}

impl From<&str> for ArgItem {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// The mapping form of a handle descriptor, before normalization.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CmdDesc {
    /// Invoking environment tokens (interpreter and fixed options).
    #[serde(default)]
    pub cmd: Option<serde_yaml::Value>,
    /// Argument-list spec appended after the environment.
    #[serde(default)]
    pub args: Option<serde_yaml::Value>,
    /// Nested descriptors overriding `args` for a positional sub-argument.
    #[serde(default, rename = "subCmd")]
    pub sub_cmd: BTreeMap<String, serde_yaml::Value>,
    /// Flags local to this handle.
    #[serde(default)]
    pub flags: BTreeMap<String, serde_yaml::Value>,
    /// Operator-provided help. When present, `--help` is answered by summon.
    #[serde(default)]
    pub help: Option<String>,
    /// Template whose whitespace-split output lists completion candidates.
    #[serde(default)]
    pub completion: Option<String>,
    /// Hides the handle from help listings.
    #[serde(default)]
    pub hidden: bool,
    /// Collapses the rendered argument list into one argument.
    #[serde(default)]
    pub join: Option<bool>,
}

/// The full form of a flag descriptor. A bare string is shorthand for `effect`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FlagSpec {
    /// Template producing the value injected when the flag is set.
    #[serde(default)]
    pub effect: String,
    /// Single-letter alias.
    #[serde(default)]
    pub shorthand: Option<String>,
    /// Value used when the flag is given without one.
    #[serde(default)]
    pub default: Option<String>,
    /// One-line description shown in help.
    #[serde(default)]
    pub help: Option<String>,
    /// When true, the effect is only inserted where `flagValue` references it.
    #[serde(default)]
    pub explicit: bool,
}

impl FlagSpec {
    /// Builds the `FlagSpec` a bare string descriptor stands for.
    pub fn from_effect(effect: impl Into<String>) -> Self {
        Self {
            effect: effect.into(),
            ..Default::default()
        }
    }

    /// The shorthand as a single character, if one was declared.
    pub fn shorthand_char(&self) -> Option<char> {
        self.shorthand.as_deref().and_then(|s| s.chars().next())
    }
}

// --- IN-MEMORY MODELS (The normalized command graph) ---

/// Stable index of a `CommandSpec` inside a `CommandGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecId(pub usize);

/// One node of the canonical command graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Resolved invoker tokens, still holding template text.
    pub exec_environment: Vec<String>,
    /// Argument-list spec, still holding template text.
    pub args: Vec<ArgItem>,
    /// Positional overrides, by sub-argument name.
    pub sub_cmd: BTreeMap<String, SpecId>,
    /// Flags declared on this node.
    pub flags: BTreeMap<String, FlagSpec>,
    /// Operator-provided help text.
    pub help: Option<String>,
    /// Completion template.
    pub completion: Option<String>,
    /// Hidden from help listings.
    pub hidden: bool,
    /// Collapse the argument list into a single token.
    pub join: bool,
}

/// The normalized, immutable command graph built once per process.
///
/// Specs live in an arena; handles and sub-commands refer to them by `SpecId`.
#[derive(Debug, Clone, Default)]
pub struct CommandGraph {
    specs: Vec<CommandSpec>,
    /// Top-level handle name to its spec.
    pub handles: BTreeMap<String, SpecId>,
    /// Flags registered persistently at the root.
    pub global_flags: BTreeMap<String, FlagSpec>,
}

impl CommandGraph {
    /// Stores a spec and returns its id.
    pub fn push(&mut self, spec: CommandSpec) -> SpecId {
        self.specs.push(spec);
        SpecId(self.specs.len() - 1)
    }

    /// Looks a spec up by id.
    pub fn spec(&self, id: SpecId) -> Option<&CommandSpec> {
        self.specs.get(id.0)
    }

    pub(crate) fn spec_mut(&mut self, id: SpecId) -> Option<&mut CommandSpec> {
        self.specs.get_mut(id.0)
    }

    /// Looks a top-level handle up by name.
    pub fn handle(&self, name: &str) -> Option<SpecId> {
        self.handles.get(name).copied()
    }

    /// Names of all top-level handles, sorted.
    pub fn handle_names(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_nested_arg_items() {
        let items = vec![
            ArgItem::from("a"),
            ArgItem::List(vec![ArgItem::from("b"), ArgItem::List(vec![ArgItem::from("c")])]),
            ArgItem::List(vec![]),
        ];
        assert_eq!(ArgItem::flatten(&items), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flag_spec_shorthand_char() {
        let spec = FlagSpec {
            shorthand: Some("u".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.shorthand_char(), Some('u'));
        assert_eq!(FlagSpec::from_effect("X").shorthand_char(), None);
    }
}
