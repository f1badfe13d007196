//! Error types and the diagnostics sink used to report contained failures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that surface to the caller. Everything else (unprobeable
/// candidates, unreadable directories) is contained, reported through the
/// [`DiagnosticsSink`], and skipped.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to parse interpreter spec `{spec}`: invalid token `{offending}`")]
    SpecParse { spec: String, offending: String },

    #[error("cache I/O failure at {path}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single candidate was rejected. These never abort discovery; the
/// driver reports them and moves on to the next candidate.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("{0} is not executable")]
    NotExecutable(PathBuf),

    #[error("shim {0} does not resolve to an installed interpreter")]
    ShimUnresolved(PathBuf),

    #[error("failed to spawn {exe}: {source}")]
    SpawnFailed {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{exe} exited with {code:?}: {stderr}")]
    ProbeFailed {
        exe: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{exe} did not answer within {timeout:?}")]
    TimedOut { exe: PathBuf, timeout: Duration },

    #[error("{exe} produced invalid interrogation output: {detail}")]
    InvalidJson { exe: PathBuf, detail: String },
}

/// Receives the contained failures of one discovery call. Implementations
/// must not panic; the driver calls them on every skipped candidate.
pub trait DiagnosticsSink {
    /// A candidate executable was rejected by the verifier.
    fn candidate_rejected(&self, rejection: &Rejection);

    /// A location provider hit a non-fatal error (unreadable directory,
    /// denied registry hive) and its remaining candidates were skipped.
    fn provider_error(&self, provider: &str, detail: &str);

    /// A cache read or write failed; discovery proceeds without caching
    /// the affected entry.
    fn cache_error(&self, path: &Path, detail: &str);
}

/// Default sink: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn candidate_rejected(&self, rejection: &Rejection) {
        tracing::debug!("candidate rejected: {rejection}");
    }

    fn provider_error(&self, provider: &str, detail: &str) {
        tracing::warn!("provider {provider} error: {detail}");
    }

    fn cache_error(&self, path: &Path, detail: &str) {
        tracing::warn!("cache error for {}: {detail}", path.display());
    }
}
