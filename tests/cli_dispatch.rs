// EN: tests/cli_dispatch.rs

use anyhow::Result;
use std::sync::Arc;
use summon::cli::MainOptions;
use summon::cli::dispatcher;
use summon::core::config_loader;
use summon::core::driver::Driver;
use summon::system::assets::AssetStore;
use summon::system::executor::{ExecutionError, RecordingRunner, Scripted};
use summon::system::prompter::ScriptedPrompter;

const CONFIG: &str = r#"
exec:
  flags:
    global: 'GLOBAL={{ flag }}'
  python -c:
    hello: ['print("hello from python!")']
  handles:
    manifest:
      cmd: [docker]
      args: ['manifests{% if args() %}/{{ arg(0) }}{% endif %}']
      subCmd:
        all:
          args: [all, subcmd]
    oneflag:
      cmd: [tool]
      flags:
        one: 'one={{ flag }}'
    defaulted:
      cmd: [tool]
      flags:
        level:
          effect: '--level={{ flag }}'
          default: info
    bracketed:
      cmd: [tool]
      args: ['[{{ flagValue("nonexistent") }}]', arg]
    plain:
      cmd: [tool]
      args: ['{{ flagValue("nonexistent") }}', arg]
    wrapped:
      cmd: [git]
    documented:
      cmd: [git]
      help: operator help for documented
    joined:
      cmd: [sh, -c]
      join: true
      args: [echo]
    listing:
      cmd: [ls]
      args: ['{{ args() }}']
    greeting:
      cmd: [echo]
      args: ['hello {{ name }}']
    placed:
      cmd: [tool]
      flags:
        target: 'TARGET={{ flag }}'
      args: [before, '{{ flagValue("target") }}', after]
    mixed:
      cmd: [tool]
      args: ['first={{ arg(0) }}']
      flags:
        mode: 'MODE={{ flag }}'
"#;

struct Harness {
    driver: Driver,
    runner: Arc<RecordingRunner>,
}

fn harness() -> Harness {
    let loaded = config_loader::parse(CONFIG, "summon.config.yaml").unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let driver = Driver::new(
        loaded,
        AssetStore::default(),
        runner.clone(),
        Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
    )
    .unwrap();
    Harness { driver, runner }
}

fn dispatch_with(h: &Harness, tokens: &[&str], options: MainOptions) -> (Result<()>, String) {
    let tokens: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
    let mut out = Vec::new();
    let result = dispatcher::dispatch(&h.driver, "summon", &tokens, &options, &mut out);
    (result, String::from_utf8(out).unwrap())
}

fn dispatch(h: &Harness, tokens: &[&str]) -> (Result<()>, String) {
    dispatch_with(h, tokens, MainOptions::default())
}

fn argvs(tokens: &[&str]) -> Vec<Vec<String>> {
    let h = harness();
    let (result, _) = dispatch(&h, tokens);
    result.unwrap();
    h.runner.argvs()
}

fn argv(tokens: &[&str]) -> Vec<String> {
    let mut calls = argvs(tokens);
    assert_eq!(calls.len(), 1, "expected exactly one call, got {calls:?}");
    calls.remove(0)
}

#[test]
fn test_composite_invoker() {
    assert_eq!(
        argv(&["run", "hello"]),
        vec!["python", "-c", "print(\"hello from python!\")"]
    );
}

#[test]
fn test_sub_argument_override() {
    assert_eq!(argv(&["run", "manifest"]), vec!["docker", "manifests"]);
    assert_eq!(argv(&["run", "manifest", "v2"]), vec!["docker", "manifests/v2"]);
    assert_eq!(argv(&["run", "manifest", "all"]), vec!["docker", "all", "subcmd"]);
}

#[test]
fn test_dry_run_never_calls_the_process() {
    assert!(argvs(&["run", "hello", "-n"]).is_empty());
    assert!(argvs(&["run", "--dry-run", "manifest", "all"]).is_empty());
}

#[test]
fn test_flags_render_in_first_seen_order() {
    assert_eq!(
        argv(&["run", "oneflag", "--one", "1", "another", "--global", "global"]),
        vec!["tool", "one=1", "GLOBAL=global", "another"]
    );
    assert_eq!(
        argv(&["run", "oneflag", "--global", "g", "--one=1"]),
        vec!["tool", "GLOBAL=g", "one=1"]
    );
}

#[test]
fn test_default_valued_flag() {
    assert_eq!(argv(&["run", "defaulted", "--level"]), vec!["tool", "--level=info"]);
    assert_eq!(argv(&["run", "defaulted", "--level=warn"]), vec!["tool", "--level=warn"]);
    assert_eq!(
        argv(&["run", "defaulted", "--level", "extra"]),
        vec!["tool", "--level=info", "extra"]
    );
}

#[test]
fn test_missing_flag_value_in_brackets_is_one_empty_argument() {
    assert_eq!(argv(&["run", "bracketed"]), vec!["tool", "", "arg"]);
    assert_eq!(argv(&["run", "plain"]), vec!["tool", "arg"]);
}

#[test]
fn test_explicit_flag_is_placed_by_its_template() {
    assert_eq!(
        argv(&["run", "placed", "x", "--target", "prod"]),
        vec!["tool", "before", "TARGET=prod", "after", "x"]
    );
}

#[test]
fn test_every_argument_is_forwarded_once() {
    assert_eq!(
        argv(&["run", "oneflag", "a", "--unknown", "b", "-z"]),
        vec!["tool", "a", "--unknown", "b", "-z"]
    );
    assert_eq!(
        argv(&["run", "listing", "a c", "b"]),
        vec!["ls", "a c", "b"]
    );
}

#[test]
fn test_terminator_passes_the_rest_verbatim() {
    assert_eq!(
        argv(&["run", "oneflag", "--", "--one", "x"]),
        vec!["tool", "--", "--one", "x"]
    );
}

#[test]
fn test_help_is_forwarded_at_its_position() {
    assert_eq!(
        argv(&["run", "wrapped", "--help", "commit"]),
        vec!["git", "--help", "commit"]
    );
    assert_eq!(
        argv(&["run", "wrapped", "status", "-h"]),
        vec!["git", "status", "-h"]
    );
}

#[test]
fn test_help_keeps_its_place_among_repeated_tokens() {
    assert_eq!(
        argv(&["run", "wrapped", "x", "--help", "x"]),
        vec!["git", "x", "--help", "x"]
    );
    assert_eq!(
        argv(&["run", "mixed", "a", "x", "--help", "x"]),
        vec!["tool", "first=a", "x", "--help", "x"]
    );
}

#[test]
fn test_help_given_as_a_flag_value_reaches_the_template() {
    assert_eq!(
        argv(&["run", "oneflag", "--one", "--help"]),
        vec!["tool", "one=--help"]
    );
}

#[test]
fn test_flag_missing_its_value_is_reported() {
    let h = harness();
    let (result, out) = dispatch(&h, &["run", "oneflag", "--one"]);
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("--one"), "{msg}");
    assert!(out.is_empty(), "{out}");
    assert!(h.runner.calls().is_empty());
}

#[test]
fn test_global_flags_after_the_handle() {
    let h = harness();
    let (result, _) = dispatch(&h, &["run", "wrapped", "-d", "status"]);
    result.unwrap();
    assert_eq!(h.runner.argvs(), vec![vec!["git", "status"]]);
    assert!(h.driver.options().debug);

    let h = harness();
    let (result, _) = dispatch(&h, &["run", "wrapped", "status", "--debug"]);
    result.unwrap();
    assert_eq!(h.runner.argvs(), vec![vec!["git", "status"]]);
    assert!(h.driver.options().debug);

    assert!(argvs(&["run", "wrapped", "status", "-n"]).is_empty());
    assert_eq!(
        argv(&["run", "greeting", "--json", r#"{"name": "cy"}"#, "--debug"]),
        vec!["echo", "hello cy"]
    );
}

fn occurrences(haystack: &[String], needle: &str) -> usize {
    haystack.iter().filter(|t| *t == needle).count()
}

#[test]
fn test_every_user_token_is_forwarded_exactly_once() {
    let tokens = [
        "run", "mixed", "a", "--mode", "fast", "b", "--unknown", "a", "-z", "b", "--", "--mode", "x",
    ];
    let argv = argv(&tokens);
    assert_eq!(
        argv,
        vec![
            "tool", "first=a", "MODE=fast", "b", "--unknown", "a", "-z", "b", "--", "--mode", "x",
        ]
    );

    // Each typed token shows up once: verbatim, or through the template
    // that consumed it (`first=a`, `MODE=fast`).
    let typed: Vec<String> = tokens.iter().skip(2).map(|t| t.to_string()).collect();
    let rendered = |token: &str| usize::from(matches!(token, "a" | "--mode" | "fast"));
    let forwarded = argv.get(1..).unwrap_or_default();
    for token in &typed {
        assert_eq!(
            occurrences(forwarded, token) + rendered(token.as_str()),
            occurrences(&typed, token),
            "{token} in {argv:?}"
        );
    }
}

#[test]
fn test_declared_help_is_answered_locally() {
    let h = harness();
    let (result, out) = dispatch(&h, &["run", "documented", "--help"]);
    result.unwrap();
    assert!(out.contains("operator help for documented"), "{out}");
    assert!(h.runner.calls().is_empty());
}

#[test]
fn test_root_help_lists_handles() {
    let h = harness();
    let (result, out) = dispatch(&h, &["run", "--help"]);
    result.unwrap();
    assert!(out.contains("manifest"), "{out}");
    assert!(out.contains("dry-run"), "{out}");
}

#[test]
fn test_join_collapses_arguments() {
    assert_eq!(
        argv(&["run", "joined", "hello", "world"]),
        vec!["sh", "-c", "echo hello world"]
    );
}

#[test]
fn test_json_data_reaches_templates() {
    assert_eq!(
        argv(&["run", "greeting", "--json", r#"{"name": "bob"}"#]),
        vec!["echo", "hello bob"]
    );
    assert_eq!(
        argv(&["--json", r#"{"name": "ann"}"#, "run", "greeting"]),
        vec!["echo", "hello ann"]
    );
}

#[test]
fn test_json_and_json_file_are_exclusive() {
    let h = harness();
    let (result, _) = dispatch(&h, &["run", "greeting", "--json", "{}", "--json-file", "data.json"]);
    let err = result.unwrap_err();
    assert!(err.to_string().contains("mutually exclusive"));
    assert!(h.runner.calls().is_empty());
}

#[test]
fn test_run_group_validation() {
    let h = harness();
    let (result, _) = dispatch(&h, &["run"]);
    assert!(result.unwrap_err().to_string().contains("requires at least 1 command to run"));

    let h = harness();
    let (result, _) = dispatch(&h, &["run", "nope"]);
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("invalid argument") && msg.contains("nope"), "{msg}");
}

#[test]
fn test_handles_at_root_without_run_group() {
    let h = harness();
    let options = MainOptions {
        without_run_subcmd: true,
    };
    let (result, _) = dispatch_with(&h, &["hello"], options);
    result.unwrap();
    assert_eq!(
        h.runner.argvs(),
        vec![vec!["python", "-c", "print(\"hello from python!\")"]]
    );
}

#[test]
fn test_exit_code_is_preserved() {
    let h = harness();
    h.runner.push(Scripted::Exit(42));
    let (result, _) = dispatch(&h, &["run", "wrapped", "status"]);
    let err = result.unwrap_err();
    let exec = err.downcast_ref::<ExecutionError>().expect("execution error");
    assert_eq!(exec.exit_code(), Some(42));
}

#[test]
fn test_completion_lists_handles() {
    let h = harness();
    let (result, out) = dispatch(&h, &["__complete", "run", "m"]);
    result.unwrap();
    assert_eq!(out.lines().collect::<Vec<_>>(), vec!["manifest"]);
}
