//! The verifier: run a candidate executable, read back its self-reported
//! metadata, and keep the result in the cache keyed by path.

mod script;

pub use script::PROBE_SCRIPT;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

use serde::Deserialize;

use crate::cache::InfoCache;
use crate::error::{DiagnosticsSink, Rejection};
use crate::info::{InterpreterInfo, VersionInfo, normalize_isa};

/// Default bound on how long one interrogation subprocess may run.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STDERR_SNIPPET: usize = 2048;

#[derive(Debug, Deserialize)]
struct ProbePayload {
    implementation: String,
    version_info: VersionInfo,
    architecture: u8,
    platform: String,
    machine: String,
    free_threaded: bool,
    #[serde(default)]
    system_executable: Option<PathBuf>,
    sysconfig_vars: BTreeMap<String, serde_json::Value>,
    sysconfig_paths: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
struct FileSignature {
    mtime: u64,
    size: u64,
}

/// Probes candidate executables on behalf of the discovery driver.
pub struct Verifier<'a> {
    env: &'a HashMap<String, String>,
    timeout: Duration,
    sink: &'a dyn DiagnosticsSink,
}

impl<'a> Verifier<'a> {
    pub fn new(
        env: &'a HashMap<String, String>,
        timeout: Duration,
        sink: &'a dyn DiagnosticsSink,
    ) -> Self {
        Verifier { env, timeout, sink }
    }

    /// Produce the metadata record for *exe*, from the cache when its entry
    /// is still valid, otherwise by interrogating the binary.
    pub fn verify(&self, exe: &Path, cache: &dyn InfoCache) -> Result<InterpreterInfo, Rejection> {
        let absolute = absolutize(exe);
        let metadata = match fs::metadata(&absolute) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(Rejection::NotFound(absolute)),
        };
        if !is_executable(&metadata) {
            return Err(Rejection::NotExecutable(absolute));
        }
        let signature = file_signature(&metadata);

        let store = cache.entry_for(&absolute);
        let _lock = match store.locked() {
            Ok(lock) => Some(lock),
            Err(error) => {
                // proceed unguarded; worst case two processes probe once each
                self.sink.cache_error(&absolute, &error.to_string());
                None
            }
        };

        if let Some(cached) = store.read() {
            if cache_entry_valid(&cached, signature) {
                tracing::debug!("cache hit for {}", absolute.display());
                return Ok(cached);
            }
            store.remove();
        }

        let payload = match self.probe_once(&absolute) {
            Ok(payload) => payload,
            Err(first) => {
                tracing::debug!(
                    "interrogation of {} failed ({first}), retrying once",
                    absolute.display()
                );
                self.probe_once(&absolute)?
            }
        };

        let info = assemble(payload, &absolute, signature);
        if let Err(error) = store.write(&info) {
            self.sink.cache_error(&absolute, &error.to_string());
        }
        Ok(info)
    }

    fn probe_once(&self, exe: &Path) -> Result<ProbePayload, Rejection> {
        let mut child = Command::new(exe)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(sanitized_env(self.env))
            .spawn()
            .map_err(|source| Rejection::SpawnFailed {
                exe: exe.to_path_buf(),
                source,
            })?;

        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");
        let stdout_reader = thread::spawn(move || read_to_string_lossy(stdout));
        let stderr_reader = thread::spawn(move || read_to_string_lossy(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(Rejection::TimedOut {
                            exe: exe.to_path_buf(),
                            timeout: self.timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(Rejection::SpawnFailed {
                        exe: exe.to_path_buf(),
                        source,
                    });
                }
            }
        };

        let out = stdout_reader.join().unwrap_or_default();
        let err = stderr_reader.join().unwrap_or_default();
        if !err.is_empty() {
            tracing::debug!("stderr from {}: {}", exe.display(), snippet(&err));
        }
        if !status.success() {
            return Err(Rejection::ProbeFailed {
                exe: exe.to_path_buf(),
                code: status.code(),
                stderr: snippet(&err),
            });
        }
        parse_payload(exe, &out)
    }
}

fn parse_payload(exe: &Path, stdout: &str) -> Result<ProbePayload, Rejection> {
    let trimmed = stdout.trim();
    if let Ok(payload) = serde_json::from_str(trimmed) {
        return Ok(payload);
    }
    // shim wrappers and login scripts sometimes print banners around the
    // document; retry on the outermost JSON object
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(payload) = serde_json::from_str(&trimmed[start..=end])
    {
        return Ok(payload);
    }
    Err(Rejection::InvalidJson {
        exe: exe.to_path_buf(),
        detail: format!("{} bytes of unparseable output", stdout.len()),
    })
}

fn assemble(payload: ProbePayload, absolute: &Path, signature: FileSignature) -> InterpreterInfo {
    InterpreterInfo {
        executable: absolute.to_path_buf(),
        system_executable: payload
            .system_executable
            .filter(|system| system.as_path() != absolute),
        implementation: payload.implementation,
        version_info: payload.version_info,
        architecture: payload.architecture,
        platform: payload.platform,
        machine: normalize_isa(&payload.machine),
        free_threaded: payload.free_threaded,
        sysconfig_vars: payload.sysconfig_vars,
        sysconfig_paths: payload.sysconfig_paths,
        mtime: signature.mtime,
        size: signature.size,
    }
}

fn cache_entry_valid(cached: &InterpreterInfo, current: FileSignature) -> bool {
    if cached.mtime != current.mtime || cached.size != current.size {
        return false;
    }
    // a vanished base interpreter invalidates the whole entry
    cached
        .system_executable
        .as_deref()
        .is_none_or(|system| system.exists())
}

fn sanitized_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env = env.clone();
    env.remove("__PYVENV_LAUNCHER__");
    env.remove("PYTHONSTARTUP");
    env.insert("PYTHONNOUSERSITE".to_string(), "1".to_string());
    env.insert("PYTHONUTF8".to_string(), "1".to_string());
    env
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn file_signature(metadata: &fs::Metadata) -> FileSignature {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_nanos() as u64)
        .unwrap_or(0);
    FileSignature {
        mtime,
        size: metadata.len(),
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

fn read_to_string_lossy(mut source: impl Read) -> String {
    let mut buffer = Vec::new();
    let _ = source.read_to_end(&mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_SNIPPET {
        trimmed.to_string()
    } else {
        let mut end = STDERR_SNIPPET;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache::{DiskCache, NoOpCache};
    use crate::error::TracingSink;
    use crate::info::ReleaseLevel;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_PAYLOAD: &str = r#"{
        "implementation": "CPython",
        "version_info": {"major": 3, "minor": 12, "micro": 1, "releaselevel": "final", "serial": 0},
        "architecture": 64,
        "platform": "linux",
        "machine": "x86_64",
        "free_threaded": false,
        "executable": "/usr/bin/python3.12",
        "system_executable": null,
        "sysconfig_vars": {"LIBDIR": "/usr/lib"},
        "sysconfig_paths": {"stdlib": "/usr/lib/python3.12"}
    }"#;

    fn write_fake_interpreter(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).unwrap();
        path
    }

    fn fake_python(dir: &Path, name: &str) -> PathBuf {
        let payload = FAKE_PAYLOAD.replace('\n', " ");
        write_fake_interpreter(dir, name, &format!("echo '{payload}'"))
    }

    fn verifier<'a>(env: &'a HashMap<String, String>, sink: &'a TracingSink) -> Verifier<'a> {
        Verifier::new(env, Duration::from_secs(5), sink)
    }

    #[test]
    fn test_verify_reads_reported_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_python(dir.path(), "python3.12");
        let env = HashMap::new();
        let sink = TracingSink;

        let info = verifier(&env, &sink).verify(&exe, &NoOpCache).unwrap();
        assert_eq!(info.executable, exe);
        assert_eq!(info.implementation, "CPython");
        assert_eq!(info.version_info.major, 3);
        assert_eq!(info.version_info.minor, 12);
        assert_eq!(info.version_info.releaselevel, ReleaseLevel::Final);
        assert_eq!(info.architecture, 64);
        assert!(info.size > 0);
        assert!(info.mtime > 0);
    }

    #[test]
    fn test_verify_rejects_missing_and_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::new();
        let sink = TracingSink;
        let verifier = verifier(&env, &sink);

        let missing = dir.path().join("nope");
        assert!(matches!(
            verifier.verify(&missing, &NoOpCache),
            Err(Rejection::NotFound(_))
        ));

        let plain = dir.path().join("data.txt");
        fs::write(&plain, "not a program").unwrap();
        let mut permissions = fs::metadata(&plain).unwrap().permissions();
        permissions.set_mode(0o644);
        fs::set_permissions(&plain, permissions).unwrap();
        assert!(matches!(
            verifier.verify(&plain, &NoOpCache),
            Err(Rejection::NotExecutable(_))
        ));
    }

    #[test]
    fn test_verify_rejects_non_zero_exit_and_bad_output() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::new();
        let sink = TracingSink;
        let verifier = verifier(&env, &sink);

        let failing = write_fake_interpreter(dir.path(), "broken", "echo doomed >&2; exit 3");
        match verifier.verify(&failing, &NoOpCache) {
            Err(Rejection::ProbeFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "doomed");
            }
            other => panic!("expected ProbeFailed, got {other:?}"),
        }

        let garbled = write_fake_interpreter(dir.path(), "garbled", "echo not json at all");
        assert!(matches!(
            verifier.verify(&garbled, &NoOpCache),
            Err(Rejection::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_verify_times_out_slow_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write_fake_interpreter(dir.path(), "sleepy", "sleep 30");
        let env = HashMap::new();
        let sink = TracingSink;
        let verifier = Verifier::new(&env, Duration::from_millis(200), &sink);

        let started = Instant::now();
        assert!(matches!(
            verifier.verify(&exe, &NoOpCache),
            Err(Rejection::TimedOut { .. })
        ));
        // two attempts, each bounded
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_verify_tolerates_banner_noise() {
        let dir = tempfile::tempdir().unwrap();
        let payload = FAKE_PAYLOAD.replace('\n', " ");
        let exe = write_fake_interpreter(
            dir.path(),
            "noisy",
            &format!("echo 'pyenv: resolving version'\necho '{payload}'"),
        );
        let env = HashMap::new();
        let sink = TracingSink;

        let info = verifier(&env, &sink).verify(&exe, &NoOpCache).unwrap();
        assert_eq!(info.implementation, "CPython");
    }

    #[test]
    fn test_second_verify_hits_cache_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawn-count");
        let payload = FAKE_PAYLOAD.replace('\n', " ");
        let exe = write_fake_interpreter(
            dir.path(),
            "python3.12",
            &format!("echo run >> {}\necho '{payload}'", marker.display()),
        );
        let cache = DiskCache::new(dir.path().join("cache"));
        let env = HashMap::new();
        let sink = TracingSink;
        let verifier = verifier(&env, &sink);

        let first = verifier.verify(&exe, &cache).unwrap();
        let second = verifier.verify(&exe, &cache).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_changed_binary_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache"));
        let env = HashMap::new();
        let sink = TracingSink;
        let verifier = verifier(&env, &sink);

        let exe = fake_python(dir.path(), "python3.12");
        let first = verifier.verify(&exe, &cache).unwrap();
        assert_eq!(first.version_info.micro, 1);

        // rewrite the interpreter to report a newer micro version
        let upgraded = FAKE_PAYLOAD.replace("\"micro\": 1", "\"micro\": 2").replace('\n', " ");
        write_fake_interpreter(dir.path(), "python3.12", &format!("echo '{upgraded}'"));

        let second = verifier.verify(&exe, &cache).unwrap();
        assert_eq!(second.version_info.micro, 2);
    }

    #[test]
    fn test_probe_payload_machine_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let payload = FAKE_PAYLOAD.replace("x86_64", "AMD64").replace('\n', " ");
        let exe = write_fake_interpreter(dir.path(), "python3", &format!("echo '{payload}'"));
        let env = HashMap::new();
        let sink = TracingSink;

        let info = verifier(&env, &sink).verify(&exe, &NoOpCache).unwrap();
        assert_eq!(info.machine, "x86_64");
    }
}
