//! Candidate enumeration from the `PATH` environment variable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Directories named by `PATH`, in order, skipping entries that are not
/// readable directories.
pub fn split_path_env(env: &HashMap<String, String>) -> Vec<PathBuf> {
    let Some(path) = env.get("PATH") else {
        return Vec::new();
    };
    std::env::split_paths(path)
        .filter(|entry| !entry.as_os_str().is_empty() && entry.is_dir())
        .collect()
}

/// Executable candidates in *dir*: the exact *basenames* first, most
/// specific first, then every other executable whose name matches
/// *pattern*, sorted by name ascending.
pub fn candidates_in_dir(dir: &Path, basenames: &[String], pattern: &Regex) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    for name in basenames {
        let candidate = dir.join(name);
        if is_executable_file(&candidate) && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.is_match(name))
                && !found.contains(path)
                && is_executable_file(path)
        })
        .collect();
    matches.sort();
    found.extend(matches);
    found
}

/// True for regular files the current user may execute. On Windows the
/// execute bit does not exist; existence is enough there.
pub fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
