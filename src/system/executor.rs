// EN: src/system/executor.rs

use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{command}' exited with a non-zero error code.")]
    NonZeroExitStatus { command: String, code: Option<i32> },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl ExecutionError {
    /// The exit code to mirror, when the wrapped process reported one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExitStatus { code, .. } => *code,
            _ => None,
        }
    }
}

/// A fully rendered process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment entries, appended to the inherited environment.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn display(&self) -> String {
        self.argv().join(" ")
    }
}

/// Where the standard output of the child goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stdin, stdout and stderr are wired to the terminal.
    Inherit,
    /// Stdout is captured and returned; stderr still reaches the terminal.
    Capture,
}

/// The external-process abstraction used for real runs and for test doubles.
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    /// Runs the invocation to completion. Returns the captured stdout in
    /// `Capture` mode and an empty string otherwise.
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<String, ExecutionError>;
}

/// Spawns real processes through `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation, mode: OutputMode) -> StdCommand {
        let mut command = StdCommand::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit());
        match mode {
            OutputMode::Inherit => command.stdout(Stdio::inherit()),
            OutputMode::Capture => command.stdout(Stdio::piped()),
        };
        command
    }

    // Fallback for Windows built-ins like `echo`: retry through `cmd /C`.
    fn windows_shell(invocation: &Invocation, mode: OutputMode) -> StdCommand {
        let mut shell = Invocation {
            program: "cmd".to_string(),
            args: vec!["/C".to_string()],
            env: invocation.env.clone(),
        };
        shell.args.extend(invocation.argv());
        Self::command(&shell, mode)
    }

    fn check_status(status: ExitStatus, invocation: &Invocation) -> Result<(), ExecutionError> {
        if status.success() {
            return Ok(());
        }
        Err(ExecutionError::NonZeroExitStatus {
            command: invocation.display(),
            code: status.code(),
        })
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<String, ExecutionError> {
        if invocation.program.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        log::debug!("Spawning {:?} (extra env: {:?})", invocation.argv(), invocation.env);

        let child = match Self::command(invocation, mode).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
                log::debug!("Command '{}' not found. Retrying with cmd /C.", invocation.program);
                Self::windows_shell(invocation, mode)
                    .spawn()
                    .map_err(|e| ExecutionError::CommandFailed(invocation.display(), e))?
            }
            Err(e) => return Err(ExecutionError::CommandFailed(invocation.display(), e)),
        };

        let output = child
            .wait_with_output()
            .map_err(|e| ExecutionError::CommandFailed(invocation.display(), e))?;
        Self::check_status(output.status, invocation)?;

        match mode {
            OutputMode::Inherit => Ok(String::new()),
            OutputMode::Capture => String::from_utf8(output.stdout).map_err(|source| {
                ExecutionError::InvalidUtf8Output {
                    command: invocation.display(),
                    source,
                }
            }),
        }
    }
}

/// A scripted reply for `RecordingRunner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Succeed, printing this on stdout.
    Output(String),
    /// Fail with this exit code.
    Exit(i32),
}

/// Process double: records every invocation and answers from a script.
///
/// Once the script is exhausted every call succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next unanswered call.
    pub fn push(&self, reply: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Every invocation seen so far, in call order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The argv of every invocation seen so far.
    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls().iter().map(Invocation::argv).collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<String, ExecutionError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        let reply = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match reply {
            Some(Scripted::Exit(code)) => Err(ExecutionError::NonZeroExitStatus {
                command: invocation.display(),
                code: Some(code),
            }),
            Some(Scripted::Output(out)) if mode == OutputMode::Capture => Ok(out),
            Some(Scripted::Output(_)) | None => Ok(String::new()),
        }
    }
}
