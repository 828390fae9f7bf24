// EN: src/system/assets.rs

//! The asset store: a directory of files that can be listed and instantiated
//! ("summoned") into a destination, optionally rendered as templates.

use crate::constants::CONFIG_FILENAME;
use crate::core::interpolator::RenderError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset '{0}' does not exist")]
    NotFound(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not walk the asset directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Could not render asset '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: RenderError,
    },
}

/// Where summoned files land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Dir(PathBuf),
    /// Content is written to the given writer instead of a file.
    Stdout,
}

impl Destination {
    /// `-` means stdout; anything else is a directory, with `~` expanded.
    pub fn parse(value: &str) -> Self {
        if value == "-" {
            Self::Stdout
        } else {
            Self::Dir(PathBuf::from(shellexpand::tilde(value).into_owned()))
        }
    }
}

/// What to summon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    /// One file or directory, relative to the asset root, or an alias.
    Path(String),
}

#[derive(Debug, Clone)]
pub struct SummonRequest {
    pub target: Target,
    pub destination: Destination,
    /// Copy bytes verbatim, without template rendering.
    pub raw: bool,
}

/// Renders a template string against the current template data.
pub type Render<'a> = &'a dyn Fn(&str) -> Result<String, RenderError>;

#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    root: PathBuf,
    aliases: BTreeMap<String, String>,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Every file of the store as a `/`-separated relative path, sorted.
    /// The configuration file itself is not an asset.
    pub fn list(&self) -> Result<Vec<String>, AssetError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut list: Vec<String> = self
            .files_under(&self.root)?
            .iter()
            .filter_map(|p| relative_name(&self.root, p))
            .filter(|name| name != CONFIG_FILENAME)
            .collect();
        list.sort();
        Ok(list)
    }

    /// Instantiates the requested asset(s) and returns the resulting path:
    /// the written file for a single asset, the destination directory otherwise.
    /// Returns an empty string when writing to stdout.
    pub fn summon(
        &self,
        request: &SummonRequest,
        render: Render<'_>,
        out: &mut dyn Write,
    ) -> Result<String, AssetError> {
        let dest_display = match &request.destination {
            Destination::Dir(dir) => dir.display().to_string(),
            Destination::Stdout => String::new(),
        };

        let name = match &request.target {
            Target::All => {
                for name in self.list()? {
                    let path = self.root.join(&name);
                    self.copy_one(&path, &name, request, render, out)?;
                }
                return Ok(dest_display);
            }
            Target::Path(name) => self.resolve_alias(name),
        };

        let source = self.checked_join(&name)?;
        if source.is_dir() {
            for file in self.files_under(&source)? {
                if let Some(rel) = relative_name(&source, &file) {
                    self.copy_one(&file, &rel, request, render, out)?;
                }
            }
            return Ok(dest_display);
        }
        if !source.is_file() {
            return Err(AssetError::NotFound(name));
        }
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        self.copy_one(&source, &file_name, request, render, out)
    }

    fn resolve_alias(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn checked_join(&self, name: &str) -> Result<PathBuf, AssetError> {
        let rel = Path::new(name);
        let escapes = rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes || name.is_empty() {
            return Err(AssetError::NotFound(name.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn files_under(&self, dir: &Path) -> Result<Vec<PathBuf>, AssetError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn copy_one(
        &self,
        source: &Path,
        rel_name: &str,
        request: &SummonRequest,
        render: Render<'_>,
        out: &mut dyn Write,
    ) -> Result<String, AssetError> {
        let render_err = |e: RenderError| AssetError::Render {
            name: rel_name.to_string(),
            source: e,
        };
        let bytes = fs::read(source).map_err(|e| io_err(source, e))?;

        let (target_name, content) = if request.raw {
            (rel_name.to_string(), bytes)
        } else {
            let text = String::from_utf8_lossy(&bytes);
            (
                render(rel_name).map_err(render_err)?,
                render(text.as_ref()).map_err(render_err)?.into_bytes(),
            )
        };

        match &request.destination {
            Destination::Stdout => {
                out.write_all(&content).map_err(|e| io_err(Path::new("-"), e))?;
                Ok(String::new())
            }
            Destination::Dir(dir) => {
                let target = dir.join(&target_name);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
                }
                fs::write(&target, content).map_err(|e| io_err(&target, e))?;
                log::debug!("Summoned '{}' to '{}'", rel_name, target.display());
                Ok(dunce::simplified(&target).display().to_string())
            }
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> AssetError {
    AssetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, AssetStore) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let store = AssetStore::new(dir.path());
        (dir, store)
    }

    fn fill_name(s: &str) -> Result<String, RenderError> {
        Ok(s.replace("{{ name }}", "world"))
    }

    #[test]
    fn test_list_skips_config_file() {
        let (_dir, store) = store_with(&[
            (CONFIG_FILENAME, "exec: {}"),
            ("b.txt", "b"),
            ("sub/a.txt", "a"),
        ]);
        assert_eq!(store.list().unwrap(), vec!["b.txt", "sub/a.txt"]);
    }

    #[test]
    fn test_summon_single_file_renders_content() {
        let (_dir, store) = store_with(&[("sub/hello.txt", "hello {{ name }}")]);
        let out_dir = tempdir().unwrap();
        let request = SummonRequest {
            target: Target::Path("sub/hello.txt".to_string()),
            destination: Destination::Dir(out_dir.path().to_path_buf()),
            raw: false,
        };
        let path = store.summon(&request, &fill_name, &mut Vec::new()).unwrap();
        assert!(path.ends_with("hello.txt"));
        assert_eq!(fs::read_to_string(out_dir.path().join("hello.txt")).unwrap(), "hello world");
    }

    #[test]
    fn test_summon_alias_to_stdout_raw() {
        let (_dir, store) = store_with(&[("a.txt", "hello {{ name }}")]);
        let store = store.with_aliases([("alias".to_string(), "a.txt".to_string())].into());
        let request = SummonRequest {
            target: Target::Path("alias".to_string()),
            destination: Destination::parse("-"),
            raw: true,
        };
        let mut out = Vec::new();
        assert_eq!(store.summon(&request, &fill_name, &mut out).unwrap(), "");
        assert_eq!(String::from_utf8(out).unwrap(), "hello {{ name }}");
    }

    #[test]
    fn test_summon_directory_keeps_relative_layout() {
        let (_dir, store) = store_with(&[("tpl/x/1.txt", "1"), ("tpl/2.txt", "2")]);
        let out_dir = tempdir().unwrap();
        let request = SummonRequest {
            target: Target::Path("tpl".to_string()),
            destination: Destination::Dir(out_dir.path().to_path_buf()),
            raw: true,
        };
        store.summon(&request, &fill_name, &mut Vec::new()).unwrap();
        assert!(out_dir.path().join("x/1.txt").is_file());
        assert!(out_dir.path().join("2.txt").is_file());
    }

    #[test]
    fn test_summon_rejects_missing_and_escaping_names() {
        let (_dir, store) = store_with(&[("a.txt", "a")]);
        for name in ["missing.txt", "../a.txt"] {
            let request = SummonRequest {
                target: Target::Path(name.to_string()),
                destination: Destination::Stdout,
                raw: true,
            };
            let err = store.summon(&request, &fill_name, &mut Vec::new()).unwrap_err();
            assert!(matches!(err, AssetError::NotFound(_)));
        }
    }
}
