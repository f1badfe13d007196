//! Locate Python interpreters matching a textual requirement, verify them
//! by interrogation, and cache the resulting metadata on disk.
//!
//! ```no_run
//! use pyfind::{Discovery, get_interpreter};
//!
//! let discovery = Discovery::new();
//! if let Some(info) = get_interpreter(&["python3.12"], &discovery).unwrap() {
//!     println!("{} at {}", info.spec_string(), info.executable.display());
//! }
//! ```

pub mod cache;
pub mod discovery;
pub mod error;
pub mod info;
pub mod probe;
pub mod spec;

// Re-export commonly used types
pub use cache::{ContentStore, DiskCache, InfoCache, NoOpCache, SCHEMA_VERSION};
pub use discovery::{Discovery, get_interpreter};
pub use error::{DiagnosticsSink, DiscoveryError, Rejection, TracingSink};
pub use info::{InterpreterInfo, ReleaseLevel, VersionInfo, normalize_isa};
pub use spec::PythonSpec;
pub use spec::version::{Specifier, SpecifierSet, Version};
