// EN: src/core/interpolator.rs

//! Template rendering shared by the command pipeline and asset instantiation.
//!
//! The engine owns a base `minijinja` environment configured once per process:
//! missing values render as empty strings, sequences render as bracketed
//! shell-quoted lists, and the config's `templates` source is registered under
//! the name `summon` so templates can `{% import "summon" as summon %}`.
//! Per-invocation functions (`arg`, `args`, `flagValue`, `run`...) are bound
//! by the driver on a clone of that base for every render.

use crate::constants::TEMPLATE_CONTEXT_NAME;
use minijinja::value::ValueKind;
use minijinja::{Environment, Error, ErrorKind, Output, State, UndefinedBehavior, Value};
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to render template '{template}': {source}")]
    Template {
        template: String,
        #[source]
        source: Error,
    },
    #[error("Could not split rendered value '{0}' into arguments")]
    Lex(String),
}

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    base: Environment<'static>,
}

impl TemplateEngine {
    /// Builds the base environment. `context` is the config's shared template source.
    pub fn new(context: &str) -> Result<Self, RenderError> {
        let mut env = base_environment();
        env.add_template_owned(TEMPLATE_CONTEXT_NAME, context.to_string())
            .map_err(|source| RenderError::Template {
                template: context.to_string(),
                source,
            })?;
        Ok(Self { base: env })
    }

    /// A fresh copy of the base environment, ready for per-render functions.
    pub fn environment(&self) -> Environment<'static> {
        self.base.clone()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self {
            base: base_environment(),
        }
    }
}

fn base_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_keep_trailing_newline(true);
    env.set_formatter(format_value);
    env.add_function("env", env_var);
    env
}

/// Renders `template` in `env` against `ctx`.
pub fn render(env: &Environment<'_>, template: &str, ctx: Value) -> Result<String, RenderError> {
    env.render_str(template, ctx)
        .map_err(|source| RenderError::Template {
            template: template.to_string(),
            source,
        })
}

/// Turns one rendered value into argv entries.
///
/// `[a b 'c d']` is split with shell rules (or by line when the content spans
/// several lines); `[]` yields a single empty argument; an empty render yields
/// nothing; anything else is one argument.
pub fn split_rendered(rendered: &str) -> Result<Vec<String>, RenderError> {
    let Some(inner) = rendered.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        if rendered.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![rendered.to_string()]);
    };
    if inner.is_empty() {
        return Ok(vec![String::new()]);
    }
    if inner.contains('\n') {
        return Ok(inner
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect());
    }
    shlex::split(inner).ok_or_else(|| RenderError::Lex(rendered.to_string()))
}

/// Builds a template-function error carrying `msg`.
pub fn function_error(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

fn quote(s: &str) -> String {
    shlex::try_quote(s)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

fn format_value(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(());
    }
    if value.kind() == ValueKind::Seq {
        let items: Vec<String> = value.try_iter()?.map(|item| quote(&item.to_string())).collect();
        return write!(out, "[{}]", items.join(" ")).map_err(|_| Error::from(ErrorKind::WriteFailure));
    }
    minijinja::escape_formatter(out, state, value)
}

fn env_var(name: String) -> String {
    std::env::var(name).unwrap_or_default()
}
