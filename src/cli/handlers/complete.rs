// EN: src/cli/handlers/complete.rs

//! The hidden `__complete` command: prints completion candidates for the
//! last word, one per line. Shell completion scripts call it with the words
//! typed so far.

use crate::cli::dispatcher::apply_flags;
use crate::core::command_tree::{CommandTree, NodeKind};
use crate::core::driver::Driver;
use crate::core::interpolator::RenderError;
use crate::core::session::DriverOption;
use anyhow::{Context, Result, anyhow};
use std::collections::BTreeSet;
use std::io::Write;

pub fn handle(driver: &Driver, tree: &CommandTree, words: &[String], out: &mut dyn Write) -> Result<()> {
    let (to_complete, typed) = match words.split_last() {
        Some((last, rest)) => (last.as_str(), rest),
        None => ("", words),
    };
    let routed = tree.route(typed)?;
    let node = tree
        .node(routed.node)
        .ok_or_else(|| anyhow!("Routing selected an unknown command node"))?;

    let mut candidates = Vec::new();
    if routed.args.is_empty() {
        candidates.extend(tree.visible_children(routed.node));
        if node.kind == NodeKind::Root {
            candidates.extend(driver.assets().list()?);
        }
    }

    if let (Some(template), NodeKind::Spec(id)) = (&node.completion, node.kind) {
        apply_flags(driver, &routed.flags)?;
        driver.configure([
            DriverOption::Ref(tree.reference(routed.node)),
            DriverOption::Spec(id),
            DriverOption::Args(routed.args.clone()),
        ])?;
        let rendered = driver
            .render(template)
            .with_context(|| format!("Failed to render the completion of '{}'", tree.reference(routed.node)))?;
        let words = shlex::split(&rendered).ok_or_else(|| RenderError::Lex(rendered.clone()))?;
        candidates.extend(words);
    }

    let mut seen = BTreeSet::new();
    for candidate in candidates {
        if candidate.starts_with(to_complete)
            && !routed.args.contains(&candidate)
            && seen.insert(candidate.clone())
        {
            writeln!(out, "{candidate}")?;
        }
    }
    Ok(())
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
  handles:
    deploy:
      cmd: [deploy]
      completion: 'staging production {{ env("SUMMON_TEST_UNSET_VAR") }}'
    secret:
      cmd: [secret]
      hidden: true
    docker:
      cmd: [docker]
      subCmd:
        build: [build]
"#;

    fn complete(words: &[&str]) -> Vec<String> {
        let loaded = config_loader::parse(CONFIG, "test.yaml").unwrap();
        let driver = Driver::new(
            loaded,
            AssetStore::default(),
            Arc::new(RecordingRunner::new()),
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        )
        .unwrap();
        let tree = CommandTree::build(driver.graph(), "summon", false);
        let words: Vec<String> = words.iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        handle(&driver, &tree, &words, &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_visible_handles_are_offered() {
        assert_eq!(complete(&["run", ""]), vec!["deploy", "docker"]);
        assert_eq!(complete(&["run", "do"]), vec!["docker"]);
    }

    #[test]
    fn test_sub_commands_are_offered() {
        assert_eq!(complete(&["run", "docker", ""]), vec!["build"]);
    }

    #[test]
    fn test_completion_template_skips_typed_args() {
        assert_eq!(complete(&["run", "deploy", ""]), vec!["staging", "production"]);
        assert_eq!(complete(&["run", "deploy", "staging", ""]), vec!["production"]);
    }
}
