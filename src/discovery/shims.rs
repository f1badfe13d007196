//! Version-manager (pyenv, mise, asdf) installation trees and shim
//! resolution.
//!
//! Shim resolution is a pure function of the environment, the working
//! directory and the filesystem: the manager's version environment
//! variable wins, then the nearest `.python-version` file walking up from
//! the working directory, then the manager's global pin.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::path_provider::is_executable_file;

#[derive(Debug, Clone, Copy)]
enum DefaultRoot {
    /// A dot-directory directly under the user home (`~/.pyenv`).
    HomeDotDir(&'static str),
    /// A directory under the platform data dir (`~/.local/share/mise`).
    DataDir(&'static str),
}

/// One supported version manager and its on-disk layout.
#[derive(Debug, Clone, Copy)]
pub struct VersionManager {
    pub name: &'static str,
    root_env: &'static str,
    version_env: &'static str,
    versions_subpath: &'static [&'static str],
    default_root: DefaultRoot,
}

pub const VERSION_MANAGERS: &[VersionManager] = &[
    VersionManager {
        name: "pyenv",
        root_env: "PYENV_ROOT",
        version_env: "PYENV_VERSION",
        versions_subpath: &["versions"],
        default_root: DefaultRoot::HomeDotDir(".pyenv"),
    },
    VersionManager {
        name: "mise",
        root_env: "MISE_DATA_DIR",
        version_env: "MISE_PYTHON_VERSION",
        versions_subpath: &["installs", "python"],
        default_root: DefaultRoot::DataDir("mise"),
    },
    VersionManager {
        name: "asdf",
        root_env: "ASDF_DATA_DIR",
        version_env: "ASDF_PYTHON_VERSION",
        versions_subpath: &["installs", "python"],
        default_root: DefaultRoot::HomeDotDir(".asdf"),
    },
];

impl VersionManager {
    /// The manager's data directory, from its environment variable or the
    /// platform default under the user home.
    pub fn root(&self, env: &HashMap<String, String>) -> Option<PathBuf> {
        if let Some(root) = env.get(self.root_env) {
            return Some(PathBuf::from(root));
        }
        match self.default_root {
            DefaultRoot::HomeDotDir(name) => home_dir(env).map(|home| home.join(name)),
            DefaultRoot::DataDir(name) => data_dir(env).map(|data| data.join(name)),
        }
    }

    /// Directory holding one subdirectory per installed interpreter.
    pub fn versions_dir(&self, env: &HashMap<String, String>) -> Option<PathBuf> {
        let mut dir = self.root(env)?;
        for part in self.versions_subpath {
            dir.push(part);
        }
        Some(dir)
    }

    pub fn shims_dir(&self, env: &HashMap<String, String>) -> Option<PathBuf> {
        Some(self.root(env)?.join("shims"))
    }

    /// The version strings the manager would consider active, best first.
    pub fn active_versions(&self, env: &HashMap<String, String>, cwd: &Path) -> Vec<String> {
        if let Some(pinned) = env.get(self.version_env) {
            return pinned
                .split(':')
                .map(str::trim)
                .filter(|version| !version.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(versions) = nearest_python_version_file(cwd) {
            return versions;
        }
        self.global_versions(env)
    }

    fn global_versions(&self, env: &HashMap<String, String>) -> Vec<String> {
        match self.name {
            "pyenv" => {
                let Some(root) = self.root(env) else {
                    return Vec::new();
                };
                read_version_lines(&root.join("version")).unwrap_or_default()
            }
            "asdf" => {
                let Some(home) = home_dir(env) else {
                    return Vec::new();
                };
                read_tool_versions_python(&home.join(".tool-versions"))
            }
            // mise keeps its global pin inside its own config file chain;
            // only the env var and .python-version are deterministic here
            _ => Vec::new(),
        }
    }

    /// Resolve a shim under this manager's `shims` directory to the real
    /// interpreter it would dispatch to.
    fn resolve(&self, shim: &Path, env: &HashMap<String, String>, cwd: &Path) -> ShimResolution {
        let Some(shims_dir) = self.shims_dir(env) else {
            return ShimResolution::NotAShim;
        };
        if shim.parent() != Some(shims_dir.as_path()) {
            return ShimResolution::NotAShim;
        }
        let (Some(name), Some(versions_dir)) = (shim.file_name(), self.versions_dir(env)) else {
            return ShimResolution::Unresolved;
        };
        for version in self.active_versions(env, cwd) {
            let resolved = versions_dir.join(version).join("bin").join(name);
            if is_executable_file(&resolved) {
                return ShimResolution::Resolved(resolved);
            }
        }
        ShimResolution::Unresolved
    }
}

/// Outcome of checking a candidate path against every known manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ShimResolution {
    /// The path is not inside any manager's shims directory.
    NotAShim,
    /// The shim dispatches to this real interpreter.
    Resolved(PathBuf),
    /// The path is a shim but no active version provides the executable.
    Unresolved,
}

/// Determine whether *exe* is a version-manager shim and, if so, which
/// real interpreter it would run.
pub fn resolve_shim(exe: &Path, env: &HashMap<String, String>, cwd: &Path) -> ShimResolution {
    for manager in VERSION_MANAGERS {
        match manager.resolve(exe, env, cwd) {
            ShimResolution::NotAShim => continue,
            outcome => {
                tracing::debug!("{} shim {}: {outcome:?}", manager.name, exe.display());
                return outcome;
            }
        }
    }
    ShimResolution::NotAShim
}

/// The user home, preferring the supplied environment over the host.
pub fn home_dir(env: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(home) = env.get("HOME") {
        return Some(PathBuf::from(home));
    }
    if cfg!(windows)
        && let Some(profile) = env.get("USERPROFILE")
    {
        return Some(PathBuf::from(profile));
    }
    dirs::home_dir()
}

/// The platform data directory, preferring `XDG_DATA_HOME` from the
/// supplied environment.
pub fn data_dir(env: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(data) = env.get("XDG_DATA_HOME") {
        return Some(PathBuf::from(data));
    }
    if !cfg!(any(windows, target_os = "macos"))
        && let Some(home) = env.get("HOME")
    {
        return Some(PathBuf::from(home).join(".local").join("share"));
    }
    dirs::data_dir()
}

/// Walk from *start* to the filesystem root looking for a
/// `.python-version` file with at least one version line.
fn nearest_python_version_file(start: &Path) -> Option<Vec<String>> {
    let mut current = start;
    loop {
        if let Some(versions) = read_version_lines(&current.join(".python-version")) {
            return Some(versions);
        }
        current = current.parent()?;
    }
}

// one version per line; blank lines and # comments are ignored
fn read_version_lines(file: &Path) -> Option<Vec<String>> {
    let content = fs::read_to_string(file).ok()?;
    let versions: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if versions.is_empty() { None } else { Some(versions) }
}

// asdf global pins live in ~/.tool-versions as `python 3.12.1 3.11.9`
fn read_tool_versions_python(file: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(file) else {
        return Vec::new();
    };
    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some("python") {
            return tokens.map(str::to_string).collect();
        }
    }
    Vec::new()
}
