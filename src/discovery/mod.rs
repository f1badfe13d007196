//! The discovery driver: walk the location providers in a fixed order,
//! verify candidates, return the first interpreter satisfying a spec.

pub mod basenames;
pub mod path_provider;
pub mod shims;
pub mod uv;
#[cfg(windows)]
pub mod windows;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use basenames::{candidate_basenames, executable_suffixes, spec_name_pattern};
use path_provider::{candidates_in_dir, split_path_env};
use shims::{ShimResolution, VERSION_MANAGERS, resolve_shim};

use crate::cache::{InfoCache, NoOpCache, fs_path_id};
use crate::error::{DiagnosticsSink, DiscoveryError, Rejection, TracingSink};
use crate::info::InterpreterInfo;
use crate::probe::{DEFAULT_PROBE_TIMEOUT, Verifier};
use crate::spec::PythonSpec;

/// Configuration for one or more discovery calls: hint directories, the
/// environment to consult, the metadata cache, and a diagnostics sink for
/// everything that gets skipped along the way.
pub struct Discovery {
    hints: Vec<PathBuf>,
    env: HashMap<String, String>,
    cache: Box<dyn InfoCache>,
    sink: Box<dyn DiagnosticsSink>,
    default_interpreter: Option<PathBuf>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery {
            hints: Vec::new(),
            env: std::env::vars().collect(),
            cache: Box::new(NoOpCache),
            sink: Box::new(TracingSink),
            default_interpreter: None,
            cwd: None,
            timeout: DEFAULT_PROBE_TIMEOUT,
            cancel: None,
        }
    }
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories searched ahead of the host lookup order (after literal
    /// path specs, before everything else).
    pub fn with_hints(mut self, hints: impl IntoIterator<Item = PathBuf>) -> Self {
        self.hints = hints.into_iter().collect();
        self
    }

    /// Replace the consulted environment (defaults to the process one).
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Cache verified metadata; the default verifies every time and stores
    /// nothing.
    pub fn with_cache(mut self, cache: Box<dyn InfoCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Interpreter yielded by the current-process provider, for hosts that
    /// carry a known-good default.
    pub fn with_default_interpreter(mut self, exe: impl Into<PathBuf>) -> Self {
        self.default_interpreter = Some(exe.into());
        self
    }

    /// Working directory used to resolve relative path specs and
    /// `.python-version` lookups (defaults to the process cwd).
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Bound on each interrogation subprocess.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cooperative cancellation: checked between candidates; when set the
    /// call returns absent.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Find the first interpreter satisfying the first satisfiable spec.
    /// Specs are tried in order; parse errors abort the whole call.
    pub fn discover<S: AsRef<str>>(
        &self,
        specs: &[S],
    ) -> Result<Option<InterpreterInfo>, DiscoveryError> {
        for raw in specs {
            let spec = PythonSpec::from_string(raw.as_ref())?;
            tracing::info!("find interpreter for spec {:?}", spec.str_spec);
            if let Some(found) = self.find_interpreter(&spec) {
                tracing::debug!("accepted {}", found.executable.display());
                return Ok(Some(found));
            }
            if self.cancelled() {
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Probe the configured default interpreter, if any.
    pub fn current_system(&self) -> Option<InterpreterInfo> {
        let default = self.default_interpreter.as_ref()?;
        let verifier = Verifier::new(&self.env, self.timeout, self.sink.as_ref());
        match verifier.verify(default, self.cache.as_ref()) {
            Ok(info) => Some(info),
            Err(rejection) => {
                self.sink.candidate_rejected(&rejection);
                None
            }
        }
    }

    fn find_interpreter(&self, spec: &PythonSpec) -> Option<InterpreterInfo> {
        let verifier = Verifier::new(&self.env, self.timeout, self.sink.as_ref());
        let mut tested = HashSet::new();
        let suffixes = executable_suffixes(&self.env);
        let basenames = candidate_basenames(spec, &suffixes);
        let pattern = spec_name_pattern(spec);

        // 1. literal path: exactly one candidate, no search
        if let Some(path) = &spec.path {
            let absolute = self.absolutize(path);
            return self.try_candidate(&verifier, &mut tested, spec, &absolute);
        }

        // 2. caller hints
        for dir in &self.hints {
            if self.cancelled() {
                return None;
            }
            for candidate in candidates_in_dir(dir, &basenames, &pattern) {
                if let Some(info) = self.try_candidate(&verifier, &mut tested, spec, &candidate) {
                    return Some(info);
                }
            }
        }

        // 3. current process / configured default
        if let Some(default) = self.default_interpreter.clone()
            && let Some(info) = self.try_candidate(&verifier, &mut tested, spec, &default)
        {
            return Some(info);
        }

        // 4. PEP 514 registry
        #[cfg(windows)]
        for candidate in windows::propose_paths(spec, self.sink.as_ref()) {
            if self.cancelled() {
                return None;
            }
            if let Some(info) = self.try_candidate(&verifier, &mut tested, spec, &candidate) {
                return Some(info);
            }
        }

        // 5. PATH
        for (position, dir) in split_path_env(&self.env).into_iter().enumerate() {
            if self.cancelled() {
                return None;
            }
            tracing::debug!("discover PATH[{position}]={}", dir.display());
            for candidate in candidates_in_dir(&dir, &basenames, &pattern) {
                if let Some(info) = self.try_candidate(&verifier, &mut tested, spec, &candidate) {
                    return Some(info);
                }
            }
        }

        // 6. version-manager trees and shims
        for manager in VERSION_MANAGERS {
            if self.cancelled() {
                return None;
            }
            if let Some(versions_dir) = manager.versions_dir(&self.env) {
                for version_dir in self.sorted_subdirs(manager.name, &versions_dir) {
                    let bin = version_dir.join("bin");
                    for candidate in candidates_in_dir(&bin, &basenames, &pattern) {
                        if let Some(info) =
                            self.try_candidate(&verifier, &mut tested, spec, &candidate)
                        {
                            return Some(info);
                        }
                    }
                }
            }
            if let Some(shims_dir) = manager.shims_dir(&self.env) {
                for candidate in candidates_in_dir(&shims_dir, &basenames, &pattern) {
                    if let Some(info) = self.try_candidate(&verifier, &mut tested, spec, &candidate)
                    {
                        return Some(info);
                    }
                }
            }
        }

        // 7. uv standalone toolchains
        for candidate in uv::uv_candidates(&self.env) {
            if self.cancelled() {
                return None;
            }
            if let Some(info) = self.try_candidate(&verifier, &mut tested, spec, &candidate) {
                return Some(info);
            }
        }

        None
    }

    fn try_candidate(
        &self,
        verifier: &Verifier<'_>,
        tested: &mut HashSet<String>,
        spec: &PythonSpec,
        candidate: &Path,
    ) -> Option<InterpreterInfo> {
        if self.cancelled() {
            return None;
        }
        let resolved = match resolve_shim(candidate, &self.env, &self.cwd()) {
            ShimResolution::NotAShim => candidate.to_path_buf(),
            ShimResolution::Resolved(real) => {
                tracing::debug!("resolved shim {} to {}", candidate.display(), real.display());
                real
            }
            ShimResolution::Unresolved => {
                self.sink
                    .candidate_rejected(&Rejection::ShimUnresolved(candidate.to_path_buf()));
                return None;
            }
        };

        let canonical = fs::canonicalize(&resolved).unwrap_or_else(|_| resolved.clone());
        if !tested.insert(fs_path_id(&canonical)) {
            return None;
        }

        match verifier.verify(&resolved, self.cache.as_ref()) {
            Ok(info) => {
                tracing::debug!("proposed {}", info.spec_string());
                spec.matches(&info).then_some(info)
            }
            Err(rejection) => {
                self.sink.candidate_rejected(&rejection);
                None
            }
        }
    }

    fn sorted_subdirs(&self, provider: &str, dir: &Path) -> Vec<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    self.sink
                        .provider_error(provider, &format!("{}: {error}", dir.display()));
                }
                return Vec::new();
            }
        };
        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        subdirs.sort();
        subdirs
    }

    fn cwd(&self) -> PathBuf {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd().join(path)
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Find an interpreter satisfying *specs* (tried in order) using the given
/// discovery configuration. Returns `Ok(None)` when nothing on the host
/// satisfies any spec.
pub fn get_interpreter<S: AsRef<str>>(
    specs: &[S],
    discovery: &Discovery,
) -> Result<Option<InterpreterInfo>, DiscoveryError> {
    discovery.discover(specs)
}

impl InterpreterInfo {
    /// Metadata for the host's configured default interpreter, when one is
    /// set on *discovery*.
    pub fn current_system(discovery: &Discovery) -> Option<InterpreterInfo> {
        discovery.current_system()
    }
}
