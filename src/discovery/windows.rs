//! PEP 514 registry enumeration, Windows only.
//!
//! Interpreters register under `Software\Python\<Company>\<Tag>` in HKCU
//! and HKLM. Registry metadata is only a pre-filter; every yielded path
//! still goes through the verifier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use winreg::RegKey;
use winreg::enums::{
    HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_32KEY, KEY_WOW64_64KEY,
};

use crate::error::DiagnosticsSink;
use crate::spec::PythonSpec;

static ARCH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)bit$").expect("Invalid regex"));
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("Invalid regex"));
static THREADED_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d+(\.\d+){0,2}t$").expect("Invalid regex"));

/// One PEP 514 registration, as read from the registry.
#[derive(Debug, Clone)]
pub struct RegistryInterpreter {
    pub company: String,
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub architecture: u8,
    pub free_threaded: bool,
    pub executable: PathBuf,
}

impl RegistryInterpreter {
    fn implementation(&self) -> &str {
        // PythonCore and Anaconda registrations are CPython in disguise
        match self.company.as_str() {
            "PythonCore" | "ContinuumAnalytics" => "CPython",
            other => other,
        }
    }

    fn compatible_with(&self, spec: &PythonSpec) -> bool {
        // only CPython registrations carry enough metadata to pre-filter
        if !self.implementation().eq_ignore_ascii_case("cpython") {
            return true;
        }
        if let (Some(requested), Some(found)) = (spec.major, self.major)
            && requested != found
        {
            return false;
        }
        if let (Some(requested), Some(found)) = (spec.minor, self.minor)
            && requested != found
        {
            return false;
        }
        if let Some(requested) = spec.architecture
            && requested != self.architecture
        {
            return false;
        }
        if let Some(requested) = spec.free_threaded
            && requested != self.free_threaded
        {
            return false;
        }
        if let Some(implementation) = &spec.implementation
            && !implementation.eq_ignore_ascii_case(self.implementation())
        {
            return false;
        }
        true
    }
}

/// Registered interpreter executables plausible for *spec*, in declared
/// hive order (HKCU before HKLM).
pub fn propose_paths(spec: &PythonSpec, sink: &dyn DiagnosticsSink) -> Vec<PathBuf> {
    discover_pythons(sink)
        .into_iter()
        .filter(|interpreter| interpreter.compatible_with(spec))
        .map(|interpreter| interpreter.executable)
        .collect()
}

/// Walk both hives and every company/tag pair, in declared order.
pub fn discover_pythons(sink: &dyn DiagnosticsSink) -> Vec<RegistryInterpreter> {
    let mut found = Vec::new();
    let hives = [
        (HKEY_CURRENT_USER, "HKEY_CURRENT_USER", 0, 64),
        (HKEY_LOCAL_MACHINE, "HKEY_LOCAL_MACHINE", KEY_WOW64_64KEY, 64),
        (HKEY_LOCAL_MACHINE, "HKEY_LOCAL_MACHINE", KEY_WOW64_32KEY, 32),
    ];
    for (hive, hive_name, flags, default_arch) in hives {
        let root = RegKey::predef(hive);
        let Ok(python_key) = root.open_subkey_with_flags(r"Software\Python", KEY_READ | flags)
        else {
            continue;
        };
        for company in python_key.enum_keys().flatten() {
            if company == "PyLauncher" {
                continue;
            }
            let Ok(company_key) = python_key.open_subkey(&company) else {
                sink.provider_error("registry", &format!("{hive_name}/{company}: unreadable"));
                continue;
            };
            for tag in company_key.enum_keys().flatten() {
                if let Some(interpreter) =
                    process_tag(hive_name, &company, &company_key, &tag, default_arch, sink)
                {
                    found.push(interpreter);
                }
            }
        }
    }
    found
}

fn process_tag(
    hive_name: &str,
    company: &str,
    company_key: &RegKey,
    tag: &str,
    default_arch: u8,
    sink: &dyn DiagnosticsSink,
) -> Option<RegistryInterpreter> {
    let tag_key = company_key.open_subkey(tag).ok()?;
    let key_path = format!("{hive_name}/{company}/{tag}");

    let sys_version: Option<String> = tag_key.get_value("SysVersion").ok();
    let (major, minor) = match sys_version
        .as_deref()
        .and_then(parse_version)
        .or_else(|| parse_version(tag))
    {
        Some(version) => version,
        None => {
            sink.provider_error("registry", &format!("{key_path}: unparseable version"));
            return None;
        }
    };

    let architecture = match tag_key.get_value::<String, _>("SysArchitecture") {
        Ok(text) => parse_arch(&text).unwrap_or_else(|| {
            sink.provider_error(
                "registry",
                &format!("{key_path}/SysArchitecture: invalid format {text}"),
            );
            default_arch
        }),
        Err(_) => default_arch,
    };

    let display_name: Option<String> = tag_key.get_value("DisplayName").ok();
    let free_threaded = tag_is_free_threaded(tag, display_name.as_deref());

    let install_key = company_key.open_subkey(format!(r"{tag}\InstallPath")).ok()?;
    // console executable first; pythonw has no usable stdout for probing
    let executable: PathBuf = match install_key
        .get_value::<String, _>("ExecutablePath")
        .or_else(|_| install_key.get_value::<String, _>("WindowedExecutablePath"))
    {
        Ok(path) => PathBuf::from(path),
        Err(_) => match install_key.get_value::<String, _>("") {
            Ok(install_path) => Path::new(&install_path).join("python.exe"),
            Err(_) => {
                sink.provider_error(
                    "registry",
                    &format!("{key_path}/InstallPath: no ExecutablePath or default"),
                );
                return None;
            }
        },
    };
    if !executable.exists() {
        sink.provider_error(
            "registry",
            &format!("{key_path}: {} does not exist", executable.display()),
        );
        return None;
    }

    Some(RegistryInterpreter {
        company: company.to_string(),
        major: Some(major),
        minor,
        architecture,
        free_threaded,
        executable,
    })
}

fn parse_version(text: &str) -> Option<(u64, Option<u64>)> {
    let caps = VERSION_RE.captures(text)?;
    let major = caps[1].parse().ok()?;
    let minor = caps.get(2).and_then(|m| m.as_str().parse().ok());
    Some((major, minor))
}

fn parse_arch(text: &str) -> Option<u8> {
    let caps = ARCH_RE.captures(text.trim())?;
    match &caps[1] {
        "32" => Some(32),
        "64" => Some(64),
        _ => None,
    }
}

fn tag_is_free_threaded(tag: &str, display_name: Option<&str>) -> bool {
    if let Some(name) = display_name
        && name.to_lowercase().contains("freethreaded")
    {
        return true;
    }
    THREADED_TAG_RE.is_match(tag)
}
