//! # Config Loader
//!
//! Reads `summon.config.yaml` and normalizes its polymorphic `exec` section into a
//! `CommandGraph`. A descriptor is either a list (an argument-list spec) or a mapping
//! (a full `CmdDesc`); the YAML node kind is inspected before any structural decode,
//! so downstream code never branches on the original shape again.

use crate::{
    constants::CONFIG_FILENAME,
    models::{ArgItem, CmdDesc, CommandGraph, CommandSpec, Config, FlagSpec, SpecId},
};
use serde_yaml::Value;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Represents errors that can occur while loading and normalizing the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("I/O error while reading '{path}': {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The YAML content is invalid.
    #[error("Failed to parse YAML in '{origin}': {source}")]
    Yaml {
        /// Where the content came from.
        origin: String,
        /// The underlying parsing error, with line and column.
        #[source]
        source: serde_yaml::Error,
    },
    /// The `exec` section is not a mapping.
    #[error("{origin}: 'exec' must be a mapping of invokers, 'handles' and 'flags'")]
    InvalidExec {
        /// Where the content came from.
        origin: String,
    },
    /// Two handles share a name, possibly under different invokers.
    #[error("{origin}: handle '{handle}' is declared more than once")]
    DuplicateHandle {
        /// Where the content came from.
        origin: String,
        /// The offending handle name.
        handle: String,
    },
    /// A descriptor node is neither a list nor a mapping.
    #[error("{origin}: '{path}' must be a list of arguments or a command mapping, found {found}")]
    InvalidNode {
        /// Where the content came from.
        origin: String,
        /// Dotted path of the node inside `exec`.
        path: String,
        /// The YAML kind that was found instead.
        found: &'static str,
    },
    /// A mapping descriptor has the wrong fields or field types.
    #[error("{origin}: invalid descriptor for '{path}': {source}")]
    InvalidDescriptor {
        /// Where the content came from.
        origin: String,
        /// Dotted path of the node inside `exec`.
        path: String,
        /// The underlying decoding error.
        #[source]
        source: serde_yaml::Error,
    },
    /// A flag descriptor is neither a string nor a flag mapping.
    #[error("{origin}: flag '{flag}' is invalid: {detail}")]
    InvalidFlag {
        /// Where the content came from.
        origin: String,
        /// The flag name.
        flag: String,
        /// What is wrong with it.
        detail: String,
    },
}

/// A parsed configuration together with its normalized command graph.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// The raw configuration values.
    pub config: Config,
    /// Handles and global flags, normalized.
    pub graph: CommandGraph,
    /// Human-readable origin used in error messages (usually the file path).
    pub origin: String,
}

/// Loads `summon.config.yaml` from an asset directory.
///
/// A missing file is not an error: the assets simply expose no handles.
pub fn load_from_dir(root: &Path) -> Result<LoadedConfig, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    if !path.exists() {
        log::debug!("No {} under '{}'.", CONFIG_FILENAME, root.display());
        return Ok(LoadedConfig {
            origin: path.display().to_string(),
            ..Default::default()
        });
    }
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    parse(&content, &path.display().to_string())
}

/// Parses configuration text and normalizes its `exec` section.
pub fn parse(content: &str, origin: &str) -> Result<LoadedConfig, ConfigError> {
    let config: Config = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
        origin: origin.to_string(),
        source,
    })?;
    let graph = normalize_exec(&config.exec, origin)?;
    log::debug!(
        "Normalized {} handle(s) and {} global flag(s) from '{}'.",
        graph.handles.len(),
        graph.global_flags.len(),
        origin
    );
    Ok(LoadedConfig {
        config,
        graph,
        origin: origin.to_string(),
    })
}

/// Walks the `exec` section: `flags`, `handles`, and every invoker's child map.
pub fn normalize_exec(exec: &Value, origin: &str) -> Result<CommandGraph, ConfigError> {
    let mut graph = CommandGraph::default();
    let mapping = match exec {
        Value::Null => return Ok(graph),
        Value::Mapping(m) => m,
        _ => {
            return Err(ConfigError::InvalidExec {
                origin: origin.to_string(),
            });
        }
    };

    let mut seen = HashSet::new();
    for (key, value) in mapping {
        let key = scalar_to_string(key).ok_or_else(|| ConfigError::InvalidExec {
            origin: origin.to_string(),
        })?;
        match key.as_str() {
            "flags" => {
                let flags = as_string_map(value, "flags", origin)?;
                graph.global_flags = normalize_flags(&flags, origin)?;
            }
            "handles" => {
                for (name, desc) in as_string_map(value, "handles", origin)? {
                    register_handle(&mut graph, &mut seen, &name, &desc, &[], origin)?;
                }
            }
            invoker => {
                let environment = vec![invoker.to_string()];
                for (name, desc) in as_string_map(value, invoker, origin)? {
                    register_handle(&mut graph, &mut seen, &name, &desc, &environment, origin)?;
                }
            }
        }
    }
    Ok(graph)
}

fn register_handle(
    graph: &mut CommandGraph,
    seen: &mut HashSet<String>,
    name: &str,
    desc: &Value,
    environment: &[String],
    origin: &str,
) -> Result<(), ConfigError> {
    if !seen.insert(name.to_string()) {
        return Err(ConfigError::DuplicateHandle {
            origin: origin.to_string(),
            handle: name.to_string(),
        });
    }
    let id = normalize_descriptor(graph, desc, name, environment, false, origin)?;
    graph.handles.insert(name.to_string(), id);
    Ok(())
}

/// Normalizes one descriptor node, recursing into its `subCmd` entries.
/// Children inherit the environment and `join` unless they set their own.
fn normalize_descriptor(
    graph: &mut CommandGraph,
    node: &Value,
    path: &str,
    parent_env: &[String],
    parent_join: bool,
    origin: &str,
) -> Result<SpecId, ConfigError> {
    match node {
        Value::Sequence(_) => {
            let args = to_arg_items(node, path, origin)?;
            Ok(graph.push(CommandSpec {
                exec_environment: parent_env.to_vec(),
                args,
                join: parent_join,
                ..Default::default()
            }))
        }
        Value::Mapping(_) => {
            let desc: CmdDesc = serde_yaml::from_value(node.clone()).map_err(|source| {
                ConfigError::InvalidDescriptor {
                    origin: origin.to_string(),
                    path: path.to_string(),
                    source,
                }
            })?;

            let exec_environment = match &desc.cmd {
                Some(cmd) => ArgItem::flatten(&to_arg_items(cmd, &format!("{path}.cmd"), origin)?),
                None => parent_env.to_vec(),
            };
            let join = desc.join.unwrap_or(parent_join);
            let args = match &desc.args {
                Some(args) => to_arg_items(args, &format!("{path}.args"), origin)?,
                None => Vec::new(),
            };

            let id = graph.push(CommandSpec {
                exec_environment: exec_environment.clone(),
                args,
                flags: normalize_flags(&desc.flags, origin)?,
                help: desc.help,
                completion: desc.completion,
                hidden: desc.hidden,
                join,
                ..Default::default()
            });

            for (sub_name, sub_node) in &desc.sub_cmd {
                let sub_path = format!("{path}.subCmd.{sub_name}");
                let sub_id = normalize_descriptor(
                    graph,
                    sub_node,
                    &sub_path,
                    &exec_environment,
                    join,
                    origin,
                )?;
                if let Some(spec) = graph.spec_mut(id) {
                    spec.sub_cmd.insert(sub_name.clone(), sub_id);
                }
            }
            Ok(id)
        }
        other => Err(ConfigError::InvalidNode {
            origin: origin.to_string(),
            path: path.to_string(),
            found: kind_name(other),
        }),
    }
}

/// Normalizes flag descriptors: a bare string is an `effect`, a mapping is decoded verbatim.
pub fn normalize_flags(
    flags: &BTreeMap<String, Value>,
    origin: &str,
) -> Result<BTreeMap<String, FlagSpec>, ConfigError> {
    let mut normalized = BTreeMap::new();
    for (name, value) in flags {
        let spec = match value {
            Value::String(effect) => FlagSpec::from_effect(effect.clone()),
            Value::Mapping(_) => serde_yaml::from_value::<FlagSpec>(value.clone()).map_err(|e| {
                ConfigError::InvalidFlag {
                    origin: origin.to_string(),
                    flag: name.clone(),
                    detail: e.to_string(),
                }
            })?,
            other => {
                return Err(ConfigError::InvalidFlag {
                    origin: origin.to_string(),
                    flag: name.clone(),
                    detail: format!("expected a string or a mapping, found {}", kind_name(other)),
                });
            }
        };
        if let Some(shorthand) = &spec.shorthand
            && shorthand.chars().count() != 1
        {
            return Err(ConfigError::InvalidFlag {
                origin: origin.to_string(),
                flag: name.clone(),
                detail: format!("shorthand '{shorthand}' must be a single character"),
            });
        }
        normalized.insert(name.clone(), spec);
    }
    Ok(normalized)
}

/// Converts a list node into argument items. A lone string counts as a one-item list.
fn to_arg_items(node: &Value, path: &str, origin: &str) -> Result<Vec<ArgItem>, ConfigError> {
    match node {
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::Sequence(_) => Ok(ArgItem::List(to_arg_items(item, path, origin)?)),
                other => scalar_to_string(other)
                    .map(ArgItem::Text)
                    .ok_or_else(|| ConfigError::InvalidNode {
                        origin: origin.to_string(),
                        path: path.to_string(),
                        found: kind_name(other),
                    }),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => scalar_to_string(other)
            .map(|s| vec![ArgItem::Text(s)])
            .ok_or_else(|| ConfigError::InvalidNode {
                origin: origin.to_string(),
                path: path.to_string(),
                found: kind_name(other),
            }),
    }
}

fn as_string_map(
    node: &Value,
    path: &str,
    origin: &str,
) -> Result<BTreeMap<String, Value>, ConfigError> {
    match node {
        Value::Null => Ok(BTreeMap::new()),
        Value::Mapping(m) => {
            let mut out = BTreeMap::new();
            for (k, v) in m {
                let key = scalar_to_string(k).ok_or_else(|| ConfigError::InvalidNode {
                    origin: origin.to_string(),
                    path: path.to_string(),
                    found: kind_name(k),
                })?;
                out.insert(key, v.clone());
            }
            Ok(out)
        }
        other => Err(ConfigError::InvalidNode {
            origin: origin.to_string(),
            path: path.to_string(),
            found: kind_name(other),
        }),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
