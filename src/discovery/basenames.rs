//! Executable names that could satisfy a spec: an ordered list of exact
//! basenames plus a filename pattern for versioned variants the list
//! cannot spell out (e.g. any `python3.X` when the spec is `>=3.11`).

use std::collections::HashMap;

use regex::Regex;

use crate::spec::PythonSpec;

/// Implementation prefixes tried when a spec does not pin one. `python` is
/// first: in practice every implementation installs under that name too.
pub const KNOWN_IMPLEMENTATIONS: &[&str] = &["python", "cpython", "pypy", "graalpy"];

/// Executable suffixes to try, in PATHEXT order on Windows and just the
/// empty suffix elsewhere.
pub fn executable_suffixes(env: &HashMap<String, String>) -> Vec<String> {
    if !cfg!(windows) {
        return vec![String::new()];
    }
    let pathext = env
        .get("PATHEXT")
        .map(String::as_str)
        .unwrap_or(".COM;.EXE;.BAT;.CMD");
    let mut suffixes = Vec::new();
    for ext in pathext.split(';') {
        let ext = ext.trim().to_lowercase();
        if !ext.is_empty() && !suffixes.contains(&ext) {
            suffixes.push(ext);
        }
    }
    if suffixes.is_empty() {
        suffixes.push(".exe".to_string());
    }
    suffixes
}

/// Candidate basenames for *spec*, most specific first: `impl<maj>.<min>`,
/// then `impl<maj>`, then `impl`, for each implementation the spec allows.
/// Free-threaded specs put the `t`-suffixed name before the plain one.
pub fn candidate_basenames(spec: &PythonSpec, suffixes: &[String]) -> Vec<String> {
    let implementations: Vec<&str> = match &spec.implementation {
        Some(implementation) => vec![implementation.as_str()],
        None => KNOWN_IMPLEMENTATIONS.to_vec(),
    };

    let mut names = Vec::new();
    let mut push = |stem: String| {
        for suffix in suffixes {
            let name = format!("{stem}{suffix}");
            if !names.contains(&name) {
                names.push(name);
            }
        }
    };

    for implementation in implementations {
        if let (Some(major), Some(minor)) = (spec.major, spec.minor) {
            if spec.free_threaded == Some(true) {
                push(format!("{implementation}{major}.{minor}t"));
            }
            push(format!("{implementation}{major}.{minor}"));
        }
        if let Some(major) = spec.major {
            push(format!("{implementation}{major}"));
        }
        push(implementation.to_string());
    }
    names
}

/// Filename pattern accepting every versioned executable name compatible
/// with *spec*, e.g. `python3.12` or `pypy3` for an unversioned pypy spec.
/// Pinned version components are fixed; absent ones accept any digits.
pub fn spec_name_pattern(spec: &PythonSpec) -> Regex {
    // `python` is the generic name every implementation may install under;
    // other implementation names only match when the spec pins them
    let implementations = match &spec.implementation {
        Some(implementation) => format!("python|{}", regex::escape(implementation)),
        None => "python".to_string(),
    };
    let major = spec
        .major
        .map_or_else(|| r"\d+".to_string(), |v| v.to_string());
    let minor = spec
        .minor
        .map_or_else(|| r"\d+".to_string(), |v| v.to_string());
    let micro = spec
        .micro
        .map_or_else(|| r"\d+".to_string(), |v| v.to_string());
    let version = format!(r"{major}(\.{minor}(\.{micro})?)?");
    let threaded = if spec.free_threaded == Some(true) { "t?" } else { "" };
    let version_optional = if cfg!(windows) || spec.major.is_none() { "?" } else { "" };
    let suffix = if cfg!(windows) { r"(\.exe)?" } else { "" };
    Regex::new(&format!(
        "(?i)^({implementations})({version}{threaded}){version_optional}{suffix}$"
    ))
    .expect("Invalid regex")
}
