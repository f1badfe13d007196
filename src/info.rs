//! The canonical description of one Python interpreter.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::spec::version::Version;

/// Release phase of an interpreter version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseLevel {
    Alpha,
    Beta,
    Candidate,
    Final,
}

/// The five-part `sys.version_info` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub releaselevel: ReleaseLevel,
    pub serial: u64,
}

impl VersionInfo {
    pub fn new(major: u64, minor: u64, micro: u64, releaselevel: ReleaseLevel, serial: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            releaselevel,
            serial,
        }
    }

    /// Render as a PEP 440 release string, e.g. `3.13.0rc2` or `3.12.1`.
    pub fn pep440_release(&self) -> String {
        let base = format!("{}.{}.{}", self.major, self.minor, self.micro);
        let suffix = match self.releaselevel {
            ReleaseLevel::Alpha => "a",
            ReleaseLevel::Beta => "b",
            ReleaseLevel::Candidate => "rc",
            ReleaseLevel::Final => return base,
        };
        format!("{base}{suffix}{}", self.serial)
    }

    /// The release rendered as a comparable [`Version`].
    pub fn as_version(&self) -> Version {
        self.pep440_release()
            .parse()
            .expect("rendered release is always a valid version")
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Immutable metadata record describing one interpreter, as reported by the
/// interpreter itself plus the filesystem signature used for cache validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterInfo {
    /// The binary as invoked; inside a virtual environment this is the venv
    /// executable, not the base interpreter.
    pub executable: PathBuf,

    /// The underlying base interpreter, when it differs from `executable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_executable: Option<PathBuf>,

    /// Vendor name as reported (`CPython`, `PyPy`, `GraalPy`, ...). Compared
    /// case-insensitively everywhere.
    pub implementation: String,

    pub version_info: VersionInfo,

    /// Pointer width: 32 or 64.
    pub architecture: u8,

    /// Short OS tag (`linux`, `darwin`, `win32`, ...).
    pub platform: String,

    /// Normalized instruction set architecture (`x86_64`, `arm64`, ...).
    pub machine: String,

    /// True only for no-GIL CPython builds.
    pub free_threaded: bool,

    /// Full sysconfig variable map as the interpreter reports it.
    pub sysconfig_vars: BTreeMap<String, serde_json::Value>,

    /// Install scheme paths (`stdlib`, `purelib`, `scripts`, ...).
    pub sysconfig_paths: BTreeMap<String, String>,

    /// Modification time of `executable` in nanoseconds since the epoch,
    /// captured at probe time.
    #[serde(default)]
    pub mtime: u64,

    /// Byte length of `executable` captured at probe time.
    #[serde(default)]
    pub size: u64,
}

impl InterpreterInfo {
    /// The base interpreter path, falling back to `executable` outside of
    /// virtual environments.
    pub fn system_executable(&self) -> &Path {
        self.system_executable.as_deref().unwrap_or(&self.executable)
    }

    /// True when this interpreter belongs to a virtual environment.
    pub fn is_venv(&self) -> bool {
        self.system_executable
            .as_deref()
            .is_some_and(|system| system != self.executable)
    }

    /// `major.minor.micro`, e.g. `3.12.1`.
    pub fn version_str(&self) -> String {
        self.version_info.to_string()
    }

    /// `major.minor`, e.g. `3.12`.
    pub fn version_release_str(&self) -> String {
        format!("{}.{}", self.version_info.major, self.version_info.minor)
    }

    /// Conventional executable name, e.g. `python3.12`.
    pub fn python_name(&self) -> String {
        format!("python{}.{}", self.version_info.major, self.version_info.minor)
    }

    /// Canonical rendered spec for this interpreter, e.g.
    /// `CPython3.12.1-64-x86_64` or `CPython3.13.0t-64-arm64`.
    pub fn spec_string(&self) -> String {
        format!(
            "{}{}{}-{}-{}",
            self.implementation,
            self.version_info,
            if self.free_threaded { "t" } else { "" },
            self.architecture,
            self.machine,
        )
    }
}

/// Collapse ISA aliases to one canonical lowercase name. `amd64` and
/// `x86_64` are the same silicon, as are `aarch64` and `arm64`.
pub fn normalize_isa(isa: &str) -> String {
    let low = isa.to_ascii_lowercase();
    match low.as_str() {
        "amd64" => "x86_64".to_string(),
        "aarch64" => "arm64".to_string(),
        _ => low,
    }
}
