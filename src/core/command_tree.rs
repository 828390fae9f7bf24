// EN: src/core/command_tree.rs

//! The live command hierarchy built from the normalized graph.
//!
//! Nodes live in an arena and point at their driving `CommandSpec` by id, so
//! two handles sharing a name at different depths never get confused. Every
//! node carries its flags as clap arguments; the tree assembles them into a
//! clap `Command` tree that parses the command line and renders help screens.

use crate::constants::RUN_COMMAND_NAME;
use crate::core::arg_parser::{self, BuiltinFlag, FlagDef, FlagHit};
use crate::models::{CommandGraph, SpecId};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeMap;

const GLOBAL_FLAGS_HEADING: &str = "Global Flags";

/// Index of a node in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The program itself.
    Root,
    /// The `run` grouping node.
    RunGroup,
    /// A handle or a sub-argument override, driven by this spec.
    Spec(SpecId),
}

/// One command of the tree.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Child commands by name.
    pub children: BTreeMap<String, NodeId>,
    local_flags: Vec<FlagDef>,
    /// Flags inherited by every descendant.
    persistent_flags: Vec<FlagDef>,
    /// Local, persistent, then inherited flags, as registered on the clap command.
    flags: Vec<FlagDef>,
    /// Operator-declared help text. Its presence makes summon answer `--help`.
    pub help: Option<String>,
    pub hidden: bool,
    /// Completion template.
    pub completion: Option<String>,
}

impl CommandNode {
    fn new(name: &str, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent,
            children: BTreeMap::new(),
            local_flags: Vec::new(),
            persistent_flags: Vec::new(),
            flags: Vec::new(),
            help: None,
            hidden: false,
            completion: None,
        }
    }

    fn flag(&self, name: &str) -> Option<&FlagDef> {
        self.flags.iter().find(|f| f.name() == name)
    }
}

/// Result of routing raw tokens through the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub node: NodeId,
    /// Names of the nodes descended into, root excluded.
    pub path: Vec<String>,
    /// Pass-through tokens in their original order.
    pub args: Vec<String>,
    /// Recognized flags in the order they appeared.
    pub flags: Vec<FlagHit>,
}

/// The command hierarchy and the clap parser assembled from it.
#[derive(Debug, Clone)]
pub struct CommandTree {
    nodes: Vec<CommandNode>,
    program: String,
    run_root: NodeId,
    without_run: bool,
    parser: Command,
}

// Adds `flag` unless its name is `help` or already registered. A clashing
// shorthand is dropped, the flag kept.
fn register(flags: &mut Vec<FlagDef>, mut flag: FlagDef) {
    let name = flag.name().to_string();
    if name == "help" || flags.iter().any(|f| f.name() == name || f.arg.get_long() == Some(name.as_str())) {
        return;
    }
    if let Some(c) = flag.arg.get_short()
        && flags.iter().any(|f| f.arg.get_short() == Some(c))
    {
        flag.arg = flag.arg.short(None::<char>);
    }
    flags.push(flag);
}

impl CommandTree {
    /// Builds the tree: root flags, the optional `run` group, and one node per
    /// handle and sub-argument override.
    pub fn build(graph: &CommandGraph, program: &str, without_run: bool) -> Self {
        let mut root = CommandNode::new(program, NodeKind::Root, None);
        root.local_flags
            .extend(BuiltinFlag::ROOT_LOCAL.into_iter().map(FlagDef::builtin));
        root.persistent_flags
            .extend(BuiltinFlag::ROOT_PERSISTENT.into_iter().map(FlagDef::builtin));
        for (name, spec) in &graph.global_flags {
            root.persistent_flags.push(FlagDef::declared(name, spec));
        }

        let mut tree = Self {
            nodes: vec![root],
            program: program.to_string(),
            run_root: NodeId(0),
            without_run,
            parser: Command::new(program.to_string()),
        };

        if !without_run {
            let mut run = CommandNode::new(RUN_COMMAND_NAME, NodeKind::RunGroup, Some(tree.root()));
            run.help = Some("Launch executable from summonables".to_string());
            tree.run_root = tree.attach(tree.root(), run);
        }
        if let Some(run_root) = tree.nodes.get_mut(tree.run_root.0) {
            run_root.persistent_flags.push(FlagDef::builtin(BuiltinFlag::DryRun));
        }

        for (name, id) in &graph.handles {
            tree.add_cmd_spec(graph, tree.run_root, name, *id);
        }
        tree.resolve_flags();
        tree.parser = tree.parser_command(tree.root());
        log::debug!("Command tree built with {} nodes", tree.nodes.len());
        tree
    }

    fn attach(&mut self, parent: NodeId, node: CommandNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        let name = node.name.clone();
        self.nodes.push(node);
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.insert(name, id);
        }
        id
    }

    fn add_cmd_spec(&mut self, graph: &CommandGraph, parent: NodeId, name: &str, id: SpecId) {
        let Some(spec) = graph.spec(id) else {
            return;
        };
        let mut node = CommandNode::new(name, NodeKind::Spec(id), Some(parent));
        for (flag, flag_spec) in &spec.flags {
            node.local_flags.push(FlagDef::declared(flag, flag_spec));
        }
        node.help = spec.help.clone();
        node.hidden = spec.hidden;
        node.completion = spec.completion.clone();

        let node_id = self.attach(parent, node);
        for (sub_name, sub_id) in &spec.sub_cmd {
            self.add_cmd_spec(graph, node_id, sub_name, *sub_id);
        }
    }

    // Local flags come first, so a handle's own flag shadows an inherited
    // one of the same name or shorthand.
    fn resolve_flags(&mut self) {
        for index in 0..self.nodes.len() {
            let id = NodeId(index);
            let mut flags = Vec::new();
            if let Some(node) = self.node(id) {
                for flag in node.local_flags.iter().chain(&node.persistent_flags) {
                    register(&mut flags, flag.clone());
                }
            }
            let mut current = self.node(id).and_then(|n| n.parent);
            while let Some(ancestor) = current.and_then(|c| self.node(c)) {
                for flag in &ancestor.persistent_flags {
                    let mut inherited = flag.clone();
                    inherited.arg = inherited.arg.help_heading(GLOBAL_FLAGS_HEADING);
                    register(&mut flags, inherited);
                }
                current = ancestor.parent;
            }
            if let Some(node) = self.nodes.get_mut(index) {
                node.flags = flags;
            }
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The node handles hang from: the `run` group, or the root when it is elided.
    pub fn run_root(&self) -> NodeId {
        self.run_root
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn node(&self, id: NodeId) -> Option<&CommandNode> {
        self.nodes.get(id.0)
    }

    /// The clap command tree used for parsing.
    pub fn parser(&self) -> &Command {
        &self.parser
    }

    /// Follows `names` down from the root.
    pub fn find<S: AsRef<str>>(&self, names: &[S]) -> Option<NodeId> {
        names.iter().try_fold(self.root(), |id, name| {
            self.node(id).and_then(|n| n.children.get(name.as_ref())).copied()
        })
    }

    /// Names from the root (excluded) to `id`.
    pub fn path(&self, id: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.node(c)) {
            if node.kind != NodeKind::Root {
                names.push(node.name.clone());
            }
            current = node.parent;
        }
        names.reverse();
        names
    }

    /// Handle path of `id` as typed by the user, the `run` group excluded.
    pub fn reference(&self, id: NodeId) -> String {
        self.path(id)
            .into_iter()
            .skip(usize::from(!self.without_run))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parses the tokens with clap. Subcommand names, known flags and their
    /// values go to clap; everything else comes back as `args`, untouched and
    /// in order. Everything after `--` passes through verbatim.
    pub fn route(&self, tokens: &[String]) -> Result<Routed, clap::Error> {
        let scan = arg_parser::scan(&self.parser, tokens);
        let argv = std::iter::once(self.program.clone()).chain(scan.parser_args(tokens));
        let matches = self.parser.clone().try_get_matches_from(argv)?;

        let mut levels = vec![(self.root(), &matches)];
        let mut current = (self.root(), &matches);
        while let Some((name, sub)) = current.1.subcommand() {
            let Some(child) = self.node(current.0).and_then(|n| n.children.get(name)) else {
                break;
            };
            current = (*child, sub);
            levels.push(current);
        }

        let mut flags = Vec::new();
        for class in &scan.classes {
            let arg_parser::TokenClass::Flags { ids, depth } = class else {
                continue;
            };
            let Some((node, level)) = levels.get(*depth) else {
                continue;
            };
            flags.extend(ids.iter().filter_map(|id| self.flag_hit(*node, level, id)));
        }

        let routed = Routed {
            node: current.0,
            path: scan.path.clone(),
            args: scan.extract_unknown_args(tokens),
            flags,
        };
        log::debug!("Routed {:?} to '{}'", tokens, self.path(routed.node).join(" "));
        Ok(routed)
    }

    fn flag_hit(&self, node: NodeId, matches: &ArgMatches, id: &str) -> Option<FlagHit> {
        let def = self.node(node)?.flag(id)?;
        let value = if def.arg.get_action().takes_values() {
            matches.try_get_one::<String>(id).ok().flatten()?.clone()
        } else {
            matches.try_get_one::<bool>(id).ok().flatten()?.to_string()
        };
        Some(FlagHit {
            name: id.to_string(),
            kind: def.kind.clone(),
            value,
        })
    }

    /// Visible child names of `id`.
    pub fn visible_children(&self, id: NodeId) -> Vec<String> {
        self.node(id)
            .map(|n| {
                n.children
                    .iter()
                    .filter(|(_, c)| self.node(**c).is_some_and(|c| !c.hidden))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // The command for `id` alone: its flags and descriptions, no subcommands.
    fn node_command(&self, id: NodeId) -> Command {
        let Some(node) = self.node(id) else {
            return Command::new(self.program.clone());
        };
        let mut cmd = Command::new(node.name.clone())
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(true)
            .args_override_self(true)
            .hide(node.hidden);

        match node.kind {
            NodeKind::Root => {
                let hint = if self.without_run {
                    "[handle | file to summon]"
                } else {
                    "[file to summon]"
                };
                cmd = cmd
                    .about(format!("{} main command", self.program))
                    .override_usage(format!("{} {hint} [flags]\n       {} [command]", self.program, self.program));
            }
            _ => {
                let path = self.path(id).join(" ");
                cmd = cmd.bin_name(format!("{} {path}", self.program));
                if let Some(help) = &node.help {
                    cmd = cmd.about(help.clone());
                }
            }
        }
        cmd.args(node.flags.iter().map(|f| f.arg.clone()))
    }

    fn parser_command(&self, id: NodeId) -> Command {
        let children: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children.values().copied().collect())
            .unwrap_or_default();
        children
            .into_iter()
            .fold(self.node_command(id), |cmd, child| cmd.subcommand(self.parser_command(child)))
    }

    /// The clap command describing `id`, used to render its help screen.
    /// `assets` are listed as extra subcommands of the root.
    pub fn clap_command(&self, id: NodeId, assets: &[String]) -> Command {
        let mut cmd = self.node_command(id);
        let Some(node) = self.node(id) else {
            return cmd;
        };
        let mut help = Arg::new("help")
            .long("help")
            .action(ArgAction::Help)
            .help(format!("help for {}", node.name));
        if node.flags.iter().all(|f| f.arg.get_short() != Some('h')) {
            help = help.short('h');
        }
        cmd = cmd.arg(help);

        for name in self.visible_children(id) {
            let about = node
                .children
                .get(&name)
                .and_then(|c| self.node(*c))
                .and_then(|c| c.help.clone())
                .unwrap_or_default();
            cmd = cmd.subcommand(Command::new(name).about(about));
        }
        if node.kind == NodeKind::Root {
            for asset in assets {
                if !node.children.contains_key(asset) {
                    cmd = cmd.subcommand(Command::new(asset.clone()).about(format!("summon {asset}")));
                }
            }
        }
        cmd
    }
}
