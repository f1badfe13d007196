//! Parse interpreter requirement strings and decide whether a probed
//! interpreter satisfies them. The matcher never touches the filesystem.

pub mod version;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DiscoveryError;
use crate::info::{InterpreterInfo, normalize_isa};
use version::SpecifierSet;

// impl? version? "t"? ("-" arch)? ("-" machine)?  -- matched lowercased
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z]+)?([0-9.]+)?(t)?(?:-(32|64))?(?:-([a-z0-9_]+))?$")
        .expect("Invalid regex")
});

// optional implementation prefix before a PEP 440 specifier expression
static CONSTRAINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([A-Za-z]+)\s*)?((?:===|==|~=|!=|<=|>=|<|>).+)$").expect("Invalid regex")
});

static DRIVE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]:[/\\]").expect("Invalid regex"));

/// An abstract requirement for a Python interpreter, parsed from a string
/// such as `python3.12`, `pypy3.9-64-arm64`, `>=3.11,<3.13` or a path.
///
/// A spec is either a structured token, a version-constraint expression,
/// or a literal path, never a mix.
#[derive(Debug, Clone, PartialEq)]
pub struct PythonSpec {
    /// The input string as given.
    pub str_spec: String,
    /// Lowercased implementation name; `None` matches any implementation.
    pub implementation: Option<String>,
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub micro: Option<u64>,
    /// `Some(true)` requires a no-GIL build, `Some(false)` forbids one,
    /// `None` accepts both.
    pub free_threaded: Option<bool>,
    /// Pointer width, 32 or 64.
    pub architecture: Option<u8>,
    /// Normalized ISA name.
    pub machine: Option<String>,
    /// Set when the spec is a literal filesystem path.
    pub path: Option<PathBuf>,
    /// Set when the spec is a version-constraint expression.
    pub version_specifier: Option<SpecifierSet>,
}

impl PythonSpec {
    fn empty(str_spec: &str) -> Self {
        PythonSpec {
            str_spec: str_spec.to_string(),
            implementation: None,
            major: None,
            minor: None,
            micro: None,
            free_threaded: None,
            architecture: None,
            machine: None,
            path: None,
            version_specifier: None,
        }
    }

    /// Parse a requirement string without searching for interpreters.
    pub fn from_string(string_spec: &str) -> Result<Self, DiscoveryError> {
        let raw = string_spec.trim();
        if raw.is_empty() {
            return Err(parse_error(string_spec, string_spec));
        }
        if raw.contains(['<', '>', '=', '!', '~', ',']) {
            return Self::parse_constraints(raw);
        }
        if looks_like_path(raw) {
            let mut spec = Self::empty(raw);
            spec.path = Some(PathBuf::from(raw));
            return Ok(spec);
        }
        Self::parse_token(raw)
    }

    fn parse_token(raw: &str) -> Result<Self, DiscoveryError> {
        let lowered = raw.to_lowercase();
        let caps = TOKEN_RE
            .captures(&lowered)
            .ok_or_else(|| parse_error(raw, raw))?;

        let mut spec = Self::empty(raw);
        if let Some(implementation) = caps.get(1) {
            let name = implementation.as_str();
            if !matches!(name, "py" | "python") {
                spec.implementation = Some(name.to_string());
            }
        }
        if let Some(ver) = caps.get(2) {
            let (major, minor, micro) = parse_version_parts(ver.as_str())
                .ok_or_else(|| parse_error(raw, ver.as_str()))?;
            spec.major = major;
            spec.minor = minor;
            spec.micro = micro;
            // with a version present, the spec pins the build variant: a
            // trailing `t` requires free-threading, its absence forbids it
            spec.free_threaded = Some(caps.get(3).is_some());
        }
        if let Some(arch) = caps.get(4) {
            spec.architecture = Some(if arch.as_str() == "32" { 32 } else { 64 });
        }
        if let Some(machine) = caps.get(5) {
            spec.machine = Some(normalize_isa(machine.as_str()));
        }
        Ok(spec)
    }

    fn parse_constraints(raw: &str) -> Result<Self, DiscoveryError> {
        let caps = CONSTRAINT_RE
            .captures(raw.trim())
            .ok_or_else(|| parse_error(raw, raw))?;
        let mut spec = Self::empty(raw);
        if let Some(implementation) = caps.get(1) {
            let name = implementation.as_str().to_lowercase();
            if !matches!(name.as_str(), "py" | "python") {
                spec.implementation = Some(name);
            }
        }
        let expression = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let specifier = SpecifierSet::from_str(expression)
            .map_err(|offending| parse_error(raw, &offending))?;
        spec.version_specifier = Some(specifier);
        Ok(spec)
    }

    /// True when the spec is a literal absolute path.
    pub fn is_abs(&self) -> bool {
        self.path.as_deref().is_some_and(Path::is_absolute)
    }

    /// Decide whether *info* satisfies every constraint of this spec.
    pub fn matches(&self, info: &InterpreterInfo) -> bool {
        if let Some(path) = &self.path
            && !path_matches(path, info)
        {
            return false;
        }
        if let Some(implementation) = &self.implementation
            && !implementation.eq_ignore_ascii_case(&info.implementation)
        {
            return false;
        }
        if let Some(architecture) = self.architecture
            && architecture != info.architecture
        {
            return false;
        }
        if let Some(machine) = &self.machine
            && normalize_isa(machine) != normalize_isa(&info.machine)
        {
            return false;
        }
        if let Some(free_threaded) = self.free_threaded
            && free_threaded != info.free_threaded
        {
            return false;
        }
        if let Some(specifier) = &self.version_specifier
            && !specifier.contains(&info.version_info.as_version())
        {
            return false;
        }
        let requested = [self.major, self.minor, self.micro];
        let reported = [
            info.version_info.major,
            info.version_info.minor,
            info.version_info.micro,
        ];
        requested
            .iter()
            .zip(reported)
            .all(|(requested, reported)| requested.is_none_or(|r| r == reported))
    }
}

fn parse_error(spec: &str, offending: &str) -> DiscoveryError {
    DiscoveryError::SpecParse {
        spec: spec.to_string(),
        offending: offending.to_string(),
    }
}

fn looks_like_path(raw: &str) -> bool {
    Path::new(raw).is_absolute()
        || raw.starts_with(['/', '\\', '.'])
        || raw.contains(['/', '\\'])
        || DRIVE_PREFIX_RE.is_match(raw)
}

// `312` is 3.12 and `3100` is 3.100, but only from Python 3 onward;
// a single digit or a `2x` token stays a bare major version
fn parse_version_parts(version: &str) -> Option<(Option<u64>, Option<u64>, Option<u64>)> {
    let parts: Vec<&str> = version.split('.').filter(|part| !part.is_empty()).collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let numbers: Vec<u64> = parts
        .iter()
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    Some(match numbers.as_slice() {
        [major, minor, micro] => (Some(*major), Some(*minor), Some(*micro)),
        [major, minor] => (Some(*major), Some(*minor), None),
        [single] => {
            let digits = parts[0];
            if digits.len() >= 2 && !digits.starts_with(['0', '1', '2']) {
                let major = digits[..1].parse().ok()?;
                let minor = digits[1..].parse().ok()?;
                (Some(major), Some(minor), None)
            } else {
                (Some(*single), None, None)
            }
        }
        _ => unreachable!("1..=3 parts checked above"),
    })
}

fn path_matches(path: &Path, info: &InterpreterInfo) -> bool {
    if path.is_absolute() {
        // absolute path specs only ever propose that very file
        return true;
    }
    let Some(name) = info.executable.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let requested = path.to_string_lossy();
    if cfg!(windows) {
        let stripped = name.strip_suffix(".exe").unwrap_or(name);
        stripped.eq_ignore_ascii_case(&requested) || name.eq_ignore_ascii_case(&requested)
    } else {
        name == requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{ReleaseLevel, VersionInfo};
    use std::collections::BTreeMap;

    fn parse(spec: &str) -> PythonSpec {
        PythonSpec::from_string(spec).unwrap()
    }

    fn info(implementation: &str, version: (u64, u64, u64)) -> InterpreterInfo {
        InterpreterInfo {
            executable: PathBuf::from("/usr/bin/python3.12"),
            system_executable: None,
            implementation: implementation.to_string(),
            version_info: VersionInfo::new(
                version.0,
                version.1,
                version.2,
                ReleaseLevel::Final,
                0,
            ),
            architecture: 64,
            platform: "linux".to_string(),
            machine: "x86_64".to_string(),
            free_threaded: false,
            sysconfig_vars: BTreeMap::new(),
            sysconfig_paths: BTreeMap::new(),
            mtime: 0,
            size: 0,
        }
    }

    #[test]
    fn test_parse_bare_implementation() {
        let spec = parse("python");
        assert_eq!(spec.implementation, None);
        assert_eq!(spec.major, None);
        assert_eq!(spec.free_threaded, None);

        let spec = parse("pypy");
        assert_eq!(spec.implementation, Some("pypy".to_string()));
    }

    #[test]
    fn test_parse_versioned_tokens() {
        let spec = parse("python3.12");
        assert_eq!((spec.major, spec.minor, spec.micro), (Some(3), Some(12), None));
        assert_eq!(spec.free_threaded, Some(false));

        let spec = parse("cpython3.12.1");
        assert_eq!(spec.implementation, Some("cpython".to_string()));
        assert_eq!((spec.major, spec.minor, spec.micro), (Some(3), Some(12), Some(1)));

        let spec = parse("3.13");
        assert_eq!(spec.implementation, None);
        assert_eq!((spec.major, spec.minor), (Some(3), Some(13)));
    }

    #[test]
    fn test_parse_compact_version_digits() {
        assert_eq!(parse("312").major, Some(3));
        assert_eq!(parse("312").minor, Some(12));
        assert_eq!(parse("3100").minor, Some(100));
        // single digits and pre-3 numbers are a bare major version
        assert_eq!((parse("3").major, parse("3").minor), (Some(3), None));
        assert_eq!((parse("27").major, parse("27").minor), (Some(27), None));
    }

    #[test]
    fn test_parse_free_threaded_arch_machine() {
        let spec = parse("python3.13t-64-arm64");
        assert_eq!(spec.free_threaded, Some(true));
        assert_eq!(spec.architecture, Some(64));
        assert_eq!(spec.machine, Some("arm64".to_string()));

        // machine aliases normalize at parse time
        assert_eq!(parse("python3.12-aarch64").machine, Some("arm64".to_string()));
        assert_eq!(parse("python3.12-AMD64").machine, Some("x86_64".to_string()));

        let spec = parse("python-64");
        assert_eq!(spec.architecture, Some(64));
        assert_eq!(spec.major, None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let spec = parse("CPython3.12");
        assert_eq!(spec.implementation, Some("cpython".to_string()));
        assert_eq!(parse("Python3.12").implementation, None);
    }

    #[test]
    fn test_parse_path_specs() {
        let spec = parse("/opt/py/bin/python3");
        assert_eq!(spec.path, Some(PathBuf::from("/opt/py/bin/python3")));
        assert!(spec.is_abs());

        let spec = parse("./python3");
        assert!(!spec.is_abs());
        assert!(spec.path.is_some());

        assert!(parse("bin/python3").path.is_some());
    }

    #[test]
    fn test_parse_constraint_expressions() {
        let spec = parse(">=3.11,<3.13");
        assert!(spec.version_specifier.is_some());
        assert_eq!(spec.implementation, None);
        assert_eq!(spec.major, None);

        let spec = parse("cpython>=3.11");
        assert_eq!(spec.implementation, Some("cpython".to_string()));
        assert!(spec.version_specifier.is_some());

        let spec = parse("python ~= 3.12.0");
        assert_eq!(spec.implementation, None);
        assert!(spec.version_specifier.is_some());
    }

    #[test]
    fn test_parse_rejects_invalid_specs() {
        assert!(PythonSpec::from_string("").is_err());
        assert!(PythonSpec::from_string("python3.1.2.3").is_err());
        assert!(PythonSpec::from_string("python...").is_err());
        assert!(PythonSpec::from_string("foo=bar").is_err());
        assert!(PythonSpec::from_string(">=3.11,nonsense").is_err());
        assert!(PythonSpec::from_string("py thon").is_err());
    }

    #[test]
    fn test_match_implementation_and_version() {
        let cpython = info("CPython", (3, 12, 1));

        assert!(parse("python").matches(&cpython));
        assert!(parse("python3").matches(&cpython));
        assert!(parse("python3.12").matches(&cpython));
        assert!(parse("python3.12.1").matches(&cpython));
        assert!(parse("cpython3.12").matches(&cpython));
        assert!(!parse("python3.13").matches(&cpython));
        assert!(!parse("python3.12.2").matches(&cpython));
        assert!(!parse("pypy3.12").matches(&cpython));

        let pypy = info("PyPy", (3, 9, 18));
        assert!(parse("python3.9").matches(&pypy));
        assert!(parse("pypy3.9").matches(&pypy));
        assert!(!parse("cpython3.9").matches(&pypy));
    }

    #[test]
    fn test_match_free_threaded_tri_state() {
        let mut standard = info("CPython", (3, 13, 0));
        let mut no_gil = info("CPython", (3, 13, 0));
        no_gil.free_threaded = true;

        assert!(parse("python3.13t").matches(&no_gil));
        assert!(!parse("python3.13t").matches(&standard));
        assert!(parse("python3.13").matches(&standard));
        assert!(!parse("python3.13").matches(&no_gil));
        // no version, no pin: both accepted
        assert!(parse("python").matches(&standard));
        assert!(parse("python").matches(&no_gil));

        standard.machine = "arm64".to_string();
        no_gil.machine = "arm64".to_string();
        assert!(parse("python3.13t-64-arm64").matches(&no_gil));
    }

    #[test]
    fn test_match_machine_alias() {
        let mut arm = info("CPython", (3, 12, 0));
        arm.machine = "arm64".to_string();
        assert!(parse("python3.12-arm64").matches(&arm));
        assert!(parse("python3.12-aarch64").matches(&arm));

        let mut x86 = info("CPython", (3, 12, 0));
        x86.machine = "x86_64".to_string();
        assert!(parse("python3.12-amd64").matches(&x86));
        assert!(!parse("python3.12-arm64").matches(&x86));
    }

    #[test]
    fn test_match_architecture() {
        let sixty_four = info("CPython", (3, 12, 0));
        assert!(parse("python3.12-64").matches(&sixty_four));
        assert!(!parse("python3.12-32").matches(&sixty_four));
    }

    #[test]
    fn test_match_version_constraints() {
        let info_312 = info("CPython", (3, 12, 4));
        assert!(parse(">=3.11,<3.13").matches(&info_312));
        assert!(parse("==3.12.*").matches(&info_312));
        assert!(!parse(">=3.13").matches(&info_312));
        assert!(!parse("<3.12").matches(&info_312));
        assert!(parse("cpython>=3.11").matches(&info_312));
        assert!(!parse("pypy>=3.11").matches(&info_312));

        let info_310 = info("CPython", (3, 10, 14));
        assert!(!parse(">=3.11,<3.13").matches(&info_310));
    }

    #[test]
    fn test_match_prerelease_constraint() {
        let mut candidate = info("CPython", (3, 13, 0));
        candidate.version_info = VersionInfo::new(3, 13, 0, ReleaseLevel::Candidate, 1);
        // 3.13.0rc1 sorts below the final 3.13
        assert!(parse("<3.13").matches(&candidate));
        assert!(!parse(">=3.13").matches(&candidate));
    }

    #[test]
    fn test_matcher_monotonicity() {
        // every info satisfying the stricter spec satisfies the looser one
        let loose = parse("python3");
        let strict = parse("cpython3.12.1-64-x86_64");
        let candidate = info("CPython", (3, 12, 1));
        assert!(strict.matches(&candidate));
        assert!(loose.matches(&candidate));
    }

    #[test]
    fn test_spec_string_round_trips_through_the_parser() {
        let mut candidate = info("CPython", (3, 12, 1));
        let spec = parse(&candidate.spec_string());
        assert!(spec.matches(&candidate));

        candidate.free_threaded = true;
        candidate.version_info = VersionInfo::new(3, 13, 0, ReleaseLevel::Final, 0);
        candidate.machine = "arm64".to_string();
        let spec = parse(&candidate.spec_string());
        assert!(spec.matches(&candidate));

        let pypy = info("PyPy", (3, 10, 14));
        assert!(parse(&pypy.spec_string()).matches(&pypy));
    }

    #[test]
    fn test_match_relative_path_spec_by_basename() {
        let candidate = info("CPython", (3, 12, 1));
        let mut named = candidate.clone();
        named.executable = PathBuf::from("/somewhere/else/python3.12");

        let spec = PythonSpec {
            path: Some(PathBuf::from("python3.12")),
            ..PythonSpec::empty("python3.12")
        };
        assert!(spec.matches(&named));

        let spec = PythonSpec {
            path: Some(PathBuf::from("pypy3.9")),
            ..PythonSpec::empty("pypy3.9")
        };
        assert!(!spec.matches(&named));
    }
}
