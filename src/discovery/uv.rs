//! Standalone toolchain (uv) install-dir provider.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use super::path_provider::is_executable_file;
use super::shims::data_dir;

/// Directory uv extracts standalone interpreters into.
pub fn uv_python_install_dir(env: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(dir) = env.get("UV_PYTHON_INSTALL_DIR") {
        return Some(PathBuf::from(dir));
    }
    Some(data_dir(env)?.join("uv").join("python"))
}

/// Interpreter executables inside every extracted toolchain tree, sorted
/// by toolchain directory name.
pub fn uv_candidates(env: &HashMap<String, String>) -> Vec<PathBuf> {
    let Some(install_dir) = uv_python_install_dir(env) else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(&install_dir) else {
        return Vec::new();
    };
    let mut toolchains: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    toolchains.sort();

    let mut found = Vec::new();
    for toolchain in toolchains {
        let executable = if cfg!(windows) {
            toolchain.join("python.exe")
        } else {
            toolchain.join("bin").join("python")
        };
        if is_executable_file(&executable) {
            found.push(executable);
        }
    }
    found
}
