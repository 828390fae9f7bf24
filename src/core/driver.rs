// EN: src/core/driver.rs

//! The execution pipeline: turns the selected command spec plus the current
//! session into a concrete argv and environment, and hands it to the process
//! runner.
//!
//! A `Driver` is cheap to clone. Clones share the configuration and the
//! session; `run` template calls use a child driver with its own session.

use crate::constants::MAX_RUN_DEPTH;
use crate::core::arg_parser;
use crate::core::config_loader::LoadedConfig;
use crate::core::interpolator::{self, RenderError, TemplateEngine, function_error};
use crate::core::session::{DriverOption, HelpForward, OptionError, Options, Session};
use crate::models::{ArgItem, CommandGraph, CommandSpec, Config, FlagSpec, SpecId};
use crate::system::assets::{AssetError, AssetStore, Destination, SummonRequest, Target};
use crate::system::executor::{Invocation, OutputMode, ProcessRunner};
use crate::system::prompter::Prompter;
use anyhow::{Context, Result};
use colored::Colorize;
use lazy_static::lazy_static;
use minijinja::value::{Rest, ValueKind};
use minijinja::{Environment, Value};
use regex::Regex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

lazy_static! {
    // A leading `KEY=VALUE` token of a rendered invoker.
    static ref ENV_ASSIGNMENT_RE: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").expect("valid env assignment regex");
}

/// Errors raised while resolving or building a command.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The reference names no handle of the configuration.
    #[error("Handle '{handle}' is not defined in '{origin}'")]
    UnknownHandle { handle: String, origin: String },
    /// `run` template calls nested past `MAX_RUN_DEPTH`; `chain` lists the handles.
    #[error("Nested run calls exceeded {max} levels: {}", .chain.join(" -> "))]
    RunDepthExceeded { max: usize, chain: Vec<String> },
    /// `promptValue` read a slot no `prompt` call filled.
    #[error("No previous prompts were filled for slot '{0}'")]
    MissingPrompt(String),
    #[error("Command '{0}' renders to an empty command line")]
    EmptyCommand(String),
}

/// The rendered result of `build_command`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuiltCommand {
    /// Extra environment entries taken from leading `KEY=VALUE` invoker tokens.
    pub env: Vec<(String, String)>,
    /// Program followed by its arguments.
    pub argv: Vec<String>,
}

impl BuiltCommand {
    fn into_invocation(self) -> Invocation {
        let mut argv = self.argv.into_iter();
        Invocation {
            program: argv.next().unwrap_or_default(),
            args: argv.collect(),
            env: self.env,
        }
    }

    fn display(&self) -> String {
        let env = self.env.iter().map(|(k, v)| format!("{k}={v}"));
        let argv = self.argv.iter().map(|a| {
            shlex::try_quote(a)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| a.clone())
        });
        env.chain(argv).collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug)]
struct Shared {
    loaded: LoadedConfig,
    engine: TemplateEngine,
    assets: AssetStore,
    runner: Arc<dyn ProcessRunner>,
    prompter: Arc<dyn Prompter>,
}

/// Builds and runs the commands of one configuration.
#[derive(Debug, Clone)]
pub struct Driver {
    shared: Arc<Shared>,
    session: Arc<Mutex<Session>>,
    prompts: Arc<Mutex<HashMap<String, String>>>,
}

impl Driver {
    /// Compiles the `templates` source and binds the asset store to the config's aliases.
    pub fn new(
        loaded: LoadedConfig,
        assets: AssetStore,
        runner: Arc<dyn ProcessRunner>,
        prompter: Arc<dyn Prompter>,
    ) -> Result<Self, RenderError> {
        let engine = TemplateEngine::new(&loaded.config.template_context)?;
        let assets = assets.with_aliases(loaded.config.aliases.clone());
        Ok(Self {
            shared: Arc::new(Shared {
                loaded,
                engine,
                assets,
                runner,
                prompter,
            }),
            session: Arc::new(Mutex::new(Session::default())),
            prompts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.loaded.config
    }

    pub fn graph(&self) -> &CommandGraph {
        &self.shared.loaded.graph
    }

    /// Where the configuration was read from.
    pub fn origin(&self) -> &str {
        &self.shared.loaded.origin
    }

    /// The asset store, aliases applied.
    pub fn assets(&self) -> &AssetStore {
        &self.shared.assets
    }

    /// Names of all invocable handles.
    pub fn list_invocables(&self) -> Vec<String> {
        self.graph().handle_names()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies functional options to the current session.
    pub fn configure<I>(&self, options: I) -> Result<(), OptionError>
    where
        I: IntoIterator<Item = DriverOption>,
    {
        let mut session = self.session();
        for option in options {
            session.options.apply(option)?;
        }
        Ok(())
    }

    /// A snapshot of the current options.
    pub fn options(&self) -> Options {
        self.session().options.clone()
    }

    /// Binds a flag occurrence from the command line.
    pub fn set_flag(&self, name: &str, spec: &FlagSpec, value: &str) {
        log::trace!("Flag '{}' set to '{}'", name, value);
        self.session().set_flag(name, spec, value);
    }

    /// Hands a help token to the wrapped command.
    pub fn forward_help(&self, help: HelpForward) {
        self.session().forward_help(help);
    }

    // --- Rendering ---

    /// Renders a template against the current session.
    pub fn render(&self, template: &str) -> Result<String, RenderError> {
        self.render_with_flag(template, None)
    }

    /// Renders a template and splits the result into arguments.
    pub fn render_args(&self, template: &str) -> Result<Vec<String>, RenderError> {
        interpolator::split_rendered(&self.render(template)?)
    }

    fn render_with_flag(&self, template: &str, flag: Option<&str>) -> Result<String, RenderError> {
        let mut data = self.session().options.data.clone();
        data.insert(
            "osArgs".to_string(),
            std::env::args().collect::<Vec<_>>().into(),
        );
        if let Some(flag) = flag {
            data.insert("flag".to_string(), flag.into());
        }
        let env = self.environment();
        interpolator::render(&env, template, Value::from_serialize(&data))
    }

    /// Renders (once) the effect of flag `name`. `explicit` marks it as
    /// referenced from a template. Unknown flags render as an empty string.
    fn render_flag(&self, name: &str, explicit: bool) -> Result<String, RenderError> {
        let (effect, user_value) = {
            let mut session = self.session();
            let Some(flag) = session.flags_to_render.iter_mut().find(|f| f.name == name) else {
                return Ok(String::new());
            };
            if explicit {
                flag.explicit = true;
            }
            if let Some(rendered) = &flag.rendered {
                return Ok(rendered.clone());
            }
            (flag.effect.clone(), flag.user_value.clone())
        };

        let rendered = self.render_with_flag(&effect, Some(&user_value))?;
        if let Some(flag) = self.session().flags_to_render.iter_mut().find(|f| f.name == name) {
            flag.rendered = Some(rendered.clone());
        }
        Ok(rendered)
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = self.shared.engine.environment();

        let d = self.clone();
        env.add_function(
            "arg",
            move |index: usize, messages: Rest<String>| -> Result<String, minijinja::Error> {
                let message = messages.join(" ");
                let mut session = d.session();
                if session.options.args.is_empty() {
                    return Err(function_error(message));
                }
                let Some(value) = session.options.args.get(index).cloned() else {
                    return Err(function_error(format!(
                        "{}: index {} out of range, args: {:?}",
                        message, index, session.options.args
                    )));
                };
                session.consume(index);
                Ok(value)
            },
        );

        let d = self.clone();
        env.add_function("args", move || -> Vec<String> {
            let mut session = d.session();
            session.consume_all();
            session.options.args.clone()
        });

        let d = self.clone();
        env.add_function("swallowargs", move || -> String {
            d.session().consume_all();
            String::new()
        });

        let d = self.clone();
        env.add_function("flagValue", move |name: String| -> Result<String, minijinja::Error> {
            d.render_flag(&name, true)
                .map_err(|e| function_error(e.to_string()))
        });

        let d = self.clone();
        env.add_function(
            "run",
            move |handle: String, args: Rest<String>| -> Result<String, minijinja::Error> {
                d.run_nested(&handle, args.0)
                    .map_err(|e| function_error(format!("{e:#}")))
            },
        );

        let d = self.clone();
        env.add_function(
            "summon",
            move |path: String, dest: Option<String>| -> Result<String, minijinja::Error> {
                d.summon_for_template(&path, dest)
                    .map_err(|e| function_error(e.to_string()))
            },
        );

        let d = self.clone();
        env.add_function(
            "prompt",
            move |slot: String, question: String, params: Value| -> Result<String, minijinja::Error> {
                d.prompt(&slot, &question, &params)
            },
        );

        let d = self.clone();
        env.add_function("promptValue", move |slot: String| -> Result<String, minijinja::Error> {
            d.prompts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&slot)
                .cloned()
                .ok_or_else(|| function_error(DriverError::MissingPrompt(slot).to_string()))
        });

        env
    }

    fn prompt(&self, slot: &str, question: &str, params: &Value) -> Result<String, minijinja::Error> {
        let answered = if let Some(default) = params.as_str() {
            self.shared.prompter.input(question, default)
        } else if params.kind() == ValueKind::Seq {
            let choices: Vec<String> = params.try_iter()?.map(|c| c.to_string()).collect();
            self.shared.prompter.choose(question, &choices)
        } else {
            return Err(function_error(
                "last parameter should be a default value or a list of choices",
            ));
        };
        let answer = answered.map_err(|e| function_error(e.to_string()))?;

        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot.to_string(), answer.clone());
        Ok(answer)
    }

    fn summon_for_template(&self, path: &str, dest: Option<String>) -> Result<String, AssetError> {
        let destination = match dest {
            Some(dir) => Destination::parse(&dir),
            None => Destination::Dir(std::env::temp_dir()),
        };
        let request = SummonRequest {
            target: Target::Path(path.to_string()),
            destination,
            raw: self.session().options.raw,
        };
        self.summon(&request, &mut std::io::sink())
    }

    /// Instantiates assets, rendering names and content with this driver.
    pub fn summon(&self, request: &SummonRequest, out: &mut dyn Write) -> Result<String, AssetError> {
        let render = |template: &str| self.render(template);
        self.shared.assets.summon(request, &render, out)
    }

    // --- Pipeline ---

    fn resolve_spec(&self) -> Result<(SpecId, String), DriverError> {
        let session = self.session();
        let reference = session.options.reference.clone();
        if let Some(id) = session.options.spec {
            return Ok((id, reference));
        }
        let head = reference.split_whitespace().next().unwrap_or_default();
        self.graph()
            .handle(head)
            .map(|id| (id, reference.clone()))
            .ok_or_else(|| DriverError::UnknownHandle {
                handle: reference,
                origin: self.origin().to_string(),
            })
    }

    fn spec(&self, id: SpecId) -> Result<&CommandSpec, DriverError> {
        self.graph().spec(id).ok_or_else(|| DriverError::UnknownHandle {
            handle: format!("#{}", id.0),
            origin: self.origin().to_string(),
        })
    }

    /// Descends into `sub_cmd` overrides named by the leading arguments and
    /// drops those arguments from the session.
    fn descend_sub_commands(&self, mut id: SpecId) -> Result<SpecId, DriverError> {
        let mut session = self.session();
        let mut descended = 0;
        for arg in &session.options.args {
            match self.spec(id)?.sub_cmd.get(arg) {
                Some(child) => {
                    id = *child;
                    descended += 1;
                }
                None => break,
            }
        }
        if descended > 0 {
            session.options.args.drain(..descended);
            session.consumed.clear();
            if let Some(help) = session.help.as_mut() {
                help.position = help.position.saturating_sub(descended);
            }
        }
        Ok(id)
    }

    /// Computes the environment and argv for the selected command.
    pub fn build_command(&self) -> Result<BuiltCommand> {
        let (root, reference) = self.resolve_spec()?;
        let id = self.descend_sub_commands(root)?;
        let spec = self.spec(id)?;

        // 1. Invoker, with leading KEY=VALUE entries split off.
        let invoker = self
            .render(&spec.exec_environment.join(" "))
            .with_context(|| format!("Failed to render the invoker of '{reference}'"))?;
        let tokens = shlex::split(&invoker).ok_or_else(|| RenderError::Lex(invoker.clone()))?;
        let mut env = Vec::new();
        let mut invoker_tokens = Vec::new();
        for token in tokens {
            match ENV_ASSIGNMENT_RE.captures(&token) {
                Some(caps) if invoker_tokens.is_empty() => {
                    let key = caps.get(1).map_or("", |m| m.as_str());
                    let value = caps.get(2).map_or("", |m| m.as_str());
                    env.push((key.to_string(), value.to_string()));
                }
                _ => invoker_tokens.push(token),
            }
        }

        // 2. Argument templates.
        let mut rendered = Vec::new();
        for template in ArgItem::flatten(&spec.args) {
            let value = self
                .render(&template)
                .with_context(|| format!("Failed to render the arguments of '{reference}'"))?;
            rendered.extend(interpolator::split_rendered(&value)?);
        }

        // 3. Flags not referenced by a template, in first-seen order.
        let pending: Vec<String> = self
            .session()
            .flags_to_render
            .iter()
            .filter(|f| !f.explicit)
            .map(|f| f.name.clone())
            .collect();
        for name in pending {
            let value = self
                .render_flag(&name, false)
                .with_context(|| format!("Failed to render flag '--{name}'"))?;
            rendered.extend(interpolator::split_rendered(&value)?);
        }

        // 4. Arguments no template consumed, with a forwarded help put back in place.
        rendered.extend(self.unused_args());

        let mut argv = invoker_tokens;
        if spec.join && !rendered.is_empty() {
            if argv.is_empty() {
                let mut rest = rendered.into_iter();
                argv.extend(rest.next());
                let joined: Vec<String> = rest.collect();
                if !joined.is_empty() {
                    argv.push(joined.join(" "));
                }
            } else {
                argv.push(rendered.join(" "));
            }
        } else {
            argv.extend(rendered);
        }

        if argv.is_empty() {
            return Err(DriverError::EmptyCommand(reference).into());
        }
        log::debug!("Built command for '{}': env={:?} argv={:?}", reference, env, argv);
        Ok(BuiltCommand { env, argv })
    }

    fn unused_args(&self) -> Vec<String> {
        let session = self.session();
        let mut unused = arg_parser::compute_unused(&session.options.args, &session.consumed);
        if let Some(help) = &session.help
            && !session.help_referenced()
        {
            let at = (0..help.position)
                .filter(|i| *i < session.options.args.len() && !session.consumed.contains(i))
                .count();
            unused.insert(at.min(unused.len()), help.token.clone());
        }
        unused
    }

    /// Builds and runs the selected command with the terminal attached.
    pub fn run(&self) -> Result<()> {
        self.run_with(OutputMode::Inherit).map(|_| ())
    }

    fn run_with(&self, mode: OutputMode) -> Result<String> {
        let built = self.build_command()?;
        let (dry_run, debug) = {
            let session = self.session();
            (session.options.dry_run, session.options.debug)
        };

        if dry_run || debug {
            let label = if dry_run { "Would execute" } else { "Executing" };
            eprintln!("{}: {}", label.yellow(), built.display());
        }
        if dry_run {
            return Ok(String::new());
        }
        Ok(self.shared.runner.run(&built.into_invocation(), mode)?)
    }

    fn run_nested(&self, handle: &str, args: Vec<String>) -> Result<String> {
        let child_session = {
            let session = self.session();
            if session.depth >= MAX_RUN_DEPTH {
                let mut chain = session.chain.clone();
                chain.push(handle.to_string());
                return Err(DriverError::RunDepthExceeded {
                    max: MAX_RUN_DEPTH,
                    chain,
                }
                .into());
            }
            session.fork(handle)
        };
        let (dry_run, debug) = (child_session.options.dry_run, child_session.options.debug);

        let child = Self {
            shared: Arc::clone(&self.shared),
            session: Arc::new(Mutex::new(child_session)),
            prompts: Arc::clone(&self.prompts),
        };
        child.configure([DriverOption::Ref(handle.to_string()), DriverOption::Args(args)])?;

        let mut out = child.run_with(OutputMode::Capture)?;
        if dry_run {
            out.push_str(&format!("[{handle} (dry-run)]"));
        }
        if debug {
            eprintln!("Output [{}] -> `{}`...", handle, out);
        }
        Ok(out.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config_loader;
    use crate::system::executor::{RecordingRunner, Scripted};
    use crate::system::prompter::ScriptedPrompter;

    const CONFIG: &str = r#"
exec:
  python -c:
    hello: ['print("hello from python!")']
  bash:
    hello-bash: [hello.sh]
    greet: ['{{ run("hello-bash") }}']
    loop-a: ['{{ run("loop-b") }}']
    loop-b: ['{{ run("loop-a") }}']
  handles:
    docker:
      cmd: [docker]
      args: ['manifests{% if args() %}/{{ arg(0) }}{% endif %}']
      subCmd:
        all:
          args: [all, subcmd]
    with-env:
      cmd: [FOO=bar, env]
    joined:
      cmd: [python, -c]
      join: true
      args: ['print("', these, params, '")']
    ask:
      cmd: [echo]
      args: ['{{ prompt("name", "Your name?", "anon") }}', '{{ promptValue("name") }}']
    missing:
      cmd: [echo]
      args: ['{{ arg(3, "need four args") }}']
    pick:
      cmd: [tool]
      args: ['{{ arg(0) }}']
      subCmd:
        sub: [inner]
"#;

    fn driver() -> (Driver, Arc<RecordingRunner>) {
        let loaded = config_loader::parse(CONFIG, "test.yaml").unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let driver = Driver::new(
            loaded,
            AssetStore::default(),
            runner.clone(),
            Arc::new(ScriptedPrompter::new(["alice"])),
        )
        .unwrap();
        (driver, runner)
    }

    fn build(driver: &Driver, handle: &str, args: &[&str]) -> Result<BuiltCommand> {
        driver
            .configure([
                DriverOption::Ref(handle.to_string()),
                DriverOption::Args(args.iter().map(|s| s.to_string()).collect()),
            ])
            .unwrap();
        driver.build_command()
    }

    #[test]
    fn test_composite_invoker() {
        let (d, _) = driver();
        let built = build(&d, "hello", &[]).unwrap();
        assert_eq!(built.argv, vec!["python", "-c", "print(\"hello from python!\")"]);
    }

    #[test]
    fn test_forwarded_help_goes_back_by_position() {
        let (d, _) = driver();
        d.forward_help(HelpForward {
            token: "--help".to_string(),
            position: 2,
        });
        assert_eq!(
            build(&d, "pick", &["a", "x", "x"]).unwrap().argv,
            vec!["tool", "a", "x", "--help", "x"]
        );

        let (d, _) = driver();
        d.forward_help(HelpForward {
            token: "-h".to_string(),
            position: 1,
        });
        assert_eq!(
            build(&d, "pick", &["sub", "x"]).unwrap().argv,
            vec!["tool", "inner", "-h", "x"]
        );
    }

    #[test]
    fn test_sub_command_overrides_args() {
        let (d, _) = driver();
        assert_eq!(build(&d, "docker", &[]).unwrap().argv, vec!["docker", "manifests"]);

        let (d, _) = driver();
        assert_eq!(build(&d, "docker", &["x"]).unwrap().argv, vec!["docker", "manifests/x"]);

        let (d, _) = driver();
        assert_eq!(
            build(&d, "docker", &["all", "extra"]).unwrap().argv,
            vec!["docker", "all", "subcmd", "extra"]
        );
    }

    #[test]
    fn test_leading_assignments_become_env() {
        let (d, _) = driver();
        let built = build(&d, "with-env", &["x"]).unwrap();
        assert_eq!(built.env, vec![("FOO".to_string(), "bar".to_string())]);
        assert_eq!(built.argv, vec!["env", "x"]);
    }

    #[test]
    fn test_join_collapses_arguments() {
        let (d, _) = driver();
        let built = build(&d, "joined", &[]).unwrap();
        assert_eq!(built.argv, vec!["python", "-c", "print(\" these params \")"]);
    }

    #[test]
    fn test_unknown_handle_names_config() {
        let (d, _) = driver();
        let err = build(&d, "nope", &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope") && msg.contains("test.yaml"), "{msg}");
    }

    #[test]
    fn test_arg_out_of_range_uses_caller_message() {
        let (d, _) = driver();
        let err = build(&d, "missing", &["a"]).unwrap_err();
        assert!(format!("{err:#}").contains("need four args"));
    }

    #[test]
    fn test_nested_run_captures_output() {
        let (d, runner) = driver();
        runner.push(Scripted::Output("hello from subcmd\n".to_string()));
        d.configure([DriverOption::Ref("greet".to_string())]).unwrap();
        d.run().unwrap();
        assert_eq!(
            runner.argvs(),
            vec![
                vec!["bash".to_string(), "hello.sh".to_string()],
                vec!["bash".to_string(), "hello from subcmd".to_string()],
            ]
        );
    }

    #[test]
    fn test_nested_run_under_dry_run_returns_marker() {
        let (d, runner) = driver();
        d.configure([DriverOption::Ref("greet".to_string()), DriverOption::DryRun(true)])
            .unwrap();
        // The marker is bracketed, so it splits like any bracketed render.
        let built = d.build_command().unwrap();
        assert_eq!(built.argv, vec!["bash", "hello-bash", "(dry-run)"]);
        d.run().unwrap();
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_run_cycle_hits_depth_limit() {
        // Each nesting level renders a template; give the recursion room.
        let msg = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let (d, _) = driver();
                let err = build(&d, "loop-a", &[]).unwrap_err();
                format!("{err:#}")
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(msg.contains("exceeded"), "{msg}");
        assert!(msg.contains("loop-a -> loop-b"), "{msg}");
    }

    #[test]
    fn test_prompt_answer_is_memoized() {
        let (d, _) = driver();
        let built = build(&d, "ask", &[]).unwrap();
        assert_eq!(built.argv, vec!["echo", "alice", "alice"]);
    }

    #[test]
    fn test_flag_render_is_memoized() {
        let (d, _) = driver();
        d.configure([DriverOption::Ref("hello".to_string())]).unwrap();
        d.set_flag("x", &FlagSpec::from_effect("--x={{ flag }}"), "1");
        assert_eq!(d.render_flag("x", false).unwrap(), "--x=1");
        assert_eq!(d.render_flag("x", false).unwrap(), "--x=1");
        assert_eq!(d.render_flag("unknown", true).unwrap(), "");
    }

    #[test]
    fn test_exit_status_is_propagated_verbatim() {
        let (d, runner) = driver();
        runner.push(Scripted::Exit(42));
        d.configure([DriverOption::Ref("hello".to_string())]).unwrap();
        let err = d.run().unwrap_err();
        let exec = err
            .downcast_ref::<crate::system::executor::ExecutionError>()
            .unwrap();
        assert_eq!(exec.exit_code(), Some(42));
    }

    #[test]
    fn test_list_invocables_is_sorted() {
        let (d, _) = driver();
        assert_eq!(
            d.list_invocables(),
            vec![
                "ask", "docker", "greet", "hello", "hello-bash", "joined", "loop-a", "loop-b",
                "missing", "pick", "with-env",
            ]
        );
    }
}
