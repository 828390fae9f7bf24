// EN: src/core/help_router.rs

//! Decides who answers a `--help` / `-h` token: summon itself, or the
//! wrapped command it would otherwise be forwarded to.

use crate::core::arg_parser::{self, TokenClass};
use crate::core::command_tree::{CommandTree, NodeId, NodeKind};
use crate::core::session::HelpForward;

/// Who answers the help token, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpDecision {
    /// No help token before `--`.
    None,
    /// Summon renders the help screen of this node.
    Own(NodeId),
    /// The token is removed from `tokens` and handed to the wrapped command.
    Forward {
        tokens: Vec<String>,
        help: HelpForward,
    },
}

/// Finds the first help token and decides who owns it.
///
/// Tokens are classified the way routing classifies them, so a `--help`
/// that is the value of a preceding flag, or a `-h` declared as a shorthand
/// of the current command, is not a help token. The command selected by the
/// tokens before the help token owns it when it is the root, the `run`
/// group, or carries operator-declared help.
pub fn decide(tree: &CommandTree, tokens: &[String]) -> HelpDecision {
    let scan = arg_parser::scan(tree.parser(), tokens);
    let Some(index) = scan.classes.iter().position(|c| *c == TokenClass::Help) else {
        return HelpDecision::None;
    };
    let depth = scan.depth_at(index);
    let node = tree
        .find(scan.path.get(..depth).unwrap_or_default())
        .unwrap_or_else(|| tree.root());

    let Some(selected) = tree.node(node) else {
        return HelpDecision::Own(tree.root());
    };
    let owned = matches!(selected.kind, NodeKind::Root | NodeKind::RunGroup)
        || selected.help.is_some();
    if owned {
        log::debug!("Help for '{}' is answered by summon", tree.path(node).join(" "));
        return HelpDecision::Own(node);
    }

    let mut remaining = tokens.to_vec();
    let token = remaining.remove(index);
    let help = HelpForward {
        token,
        position: scan.pass_through_before(index),
    };
    log::debug!("Forwarding {:?} to the wrapped command", help);
    HelpDecision::Forward {
        tokens: remaining,
        help,
    }
}
