//! Disk-backed cache: one JSON document per interpreter, keyed by the
//! SHA-256 of its path, with a sibling `.lock` file for cross-process
//! exclusion.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ContentStore, InfoCache, SCHEMA_VERSION, StoreLock, fs_path_id};
use crate::error::DiscoveryError;
use crate::info::InterpreterInfo;

#[derive(Serialize, Deserialize)]
struct CacheDocument {
    schema: u32,
    #[serde(flatten)]
    info: InterpreterInfo,
}

/// Filesystem cache rooted at a caller-chosen directory. Documents live at
/// `<root>/py_info/<schema>/<sha256(path)>.json`.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskCache { root: root.into() }
    }

    fn py_info_dir(&self) -> PathBuf {
        self.root.join("py_info").join(SCHEMA_VERSION.to_string())
    }
}

impl InfoCache for DiskCache {
    fn entry_for(&self, path: &Path) -> Box<dyn ContentStore> {
        let key = hex::encode(Sha256::digest(fs_path_id(path).as_bytes()));
        Box::new(DiskContentStore {
            folder: self.py_info_dir(),
            key,
        })
    }

    fn clear(&self) -> Result<(), DiscoveryError> {
        let folder = self.py_info_dir();
        if !folder.exists() {
            return Ok(());
        }
        let entries = fs::read_dir(&folder).map_err(|source| DiscoveryError::CacheIo {
            path: folder.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| DiscoveryError::CacheIo {
                path: folder.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)
                    .map_err(|source| DiscoveryError::CacheIo { path, source })?;
            }
        }
        Ok(())
    }
}

/// JSON-file content store for one interpreter path.
#[derive(Debug, Clone)]
pub struct DiskContentStore {
    folder: PathBuf,
    key: String,
}

impl DiskContentStore {
    fn file(&self) -> PathBuf {
        self.folder.join(format!("{}.json", self.key))
    }

    fn lock_file(&self) -> PathBuf {
        self.folder.join(format!("{}.lock", self.key))
    }
}

impl ContentStore for DiskContentStore {
    fn exists(&self) -> bool {
        self.file().exists()
    }

    fn read(&self) -> Option<InterpreterInfo> {
        let file = self.file();
        let raw = match fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::debug!("failed to read {}: {error}", file.display());
                return None;
            }
        };
        match serde_json::from_str::<CacheDocument>(&raw) {
            Ok(document) if document.schema == SCHEMA_VERSION => {
                tracing::debug!("got interpreter info from {}", file.display());
                Some(document.info)
            }
            Ok(document) => {
                tracing::debug!(
                    "rejecting {} written under schema {}",
                    file.display(),
                    document.schema
                );
                self.remove();
                None
            }
            Err(error) => {
                tracing::debug!("malformed cache document {}: {error}", file.display());
                self.remove();
                None
            }
        }
    }

    fn write(&self, info: &InterpreterInfo) -> std::io::Result<()> {
        fs::create_dir_all(&self.folder)?;
        let document = CacheDocument {
            schema: SCHEMA_VERSION,
            info: info.clone(),
        };
        let payload = serde_json::to_string_pretty(&document)
            .map_err(|error| std::io::Error::other(error.to_string()))?;
        // write-then-rename so concurrent readers never see a torn document
        let staging = self.folder.join(format!("{}.json.tmp", self.key));
        fs::write(&staging, payload)?;
        fs::rename(&staging, self.file())?;
        tracing::debug!("wrote interpreter info at {}", self.file().display());
        Ok(())
    }

    fn remove(&self) {
        let _ = fs::remove_file(self.file());
        tracing::debug!("removed interpreter info at {}", self.file().display());
    }

    fn locked(&self) -> std::io::Result<StoreLock> {
        fs::create_dir_all(&self.folder)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(self.lock_file())?;
        lock_exclusive(&file)?;
        Ok(StoreLock::held(file))
    }
}

fn lock_exclusive(file: &File) -> std::io::Result<()> {
    fs4::FileExt::lock_exclusive(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{ReleaseLevel, VersionInfo};
    use std::collections::BTreeMap;

    fn sample() -> InterpreterInfo {
        InterpreterInfo {
            executable: PathBuf::from("/usr/bin/python3.12"),
            system_executable: None,
            implementation: "CPython".to_string(),
            version_info: VersionInfo::new(3, 12, 1, ReleaseLevel::Final, 0),
            architecture: 64,
            platform: "linux".to_string(),
            machine: "x86_64".to_string(),
            free_threaded: false,
            sysconfig_vars: BTreeMap::new(),
            sysconfig_paths: BTreeMap::new(),
            mtime: 1_700_000_000_000_000_000,
            size: 14_328,
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let store = cache.entry_for(Path::new("/usr/bin/python3.12"));

        assert!(!store.exists());
        store.write(&sample()).unwrap();
        assert!(store.exists());
        assert_eq!(store.read().unwrap(), sample());
    }

    #[test]
    fn test_entries_are_keyed_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache
            .entry_for(Path::new("/usr/bin/python3.12"))
            .write(&sample())
            .unwrap();

        let other = cache.entry_for(Path::new("/usr/bin/python3.13"));
        assert!(!other.exists());
    }

    #[test]
    fn test_documents_live_under_schema_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache
            .entry_for(Path::new("/usr/bin/python3.12"))
            .write(&sample())
            .unwrap();

        let schema_dir = dir.path().join("py_info").join(SCHEMA_VERSION.to_string());
        let entries: Vec<_> = fs::read_dir(&schema_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].extension().unwrap(), "json");
    }

    #[test]
    fn test_schema_mismatch_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let store = cache.entry_for(Path::new("/usr/bin/python3.12"));
        store.write(&sample()).unwrap();

        let file = dir
            .path()
            .join("py_info")
            .join(SCHEMA_VERSION.to_string())
            .join(format!(
                "{}.json",
                hex::encode(Sha256::digest(b"/usr/bin/python3.12"))
            ));
        let rewritten = fs::read_to_string(&file)
            .unwrap()
            .replace("\"schema\": 4", "\"schema\": 3");
        fs::write(&file, rewritten).unwrap();

        assert!(store.read().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_malformed_document_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let store = cache.entry_for(Path::new("/usr/bin/python3.12"));
        store.write(&sample()).unwrap();

        let schema_dir = dir.path().join("py_info").join(SCHEMA_VERSION.to_string());
        for entry in fs::read_dir(&schema_dir).unwrap() {
            fs::write(entry.unwrap().path(), "{ not json").unwrap();
        }

        assert!(store.read().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_clear_removes_documents_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let store = cache.entry_for(Path::new("/usr/bin/python3.12"));
        store.write(&sample()).unwrap();
        let _lock = store.locked().unwrap();

        cache.clear().unwrap();
        assert!(!store.exists());
        // the lock file survives a clear
        assert!(
            fs::read_dir(dir.path().join("py_info").join(SCHEMA_VERSION.to_string()))
                .unwrap()
                .any(|entry| {
                    entry
                        .unwrap()
                        .path()
                        .extension()
                        .is_some_and(|ext| ext == "lock")
                })
        );
    }

    #[test]
    fn test_lock_can_be_retaken_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let store = cache.entry_for(Path::new("/usr/bin/python3.12"));

        drop(store.locked().unwrap());
        let _again = store.locked().unwrap();
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let store = cache.entry_for(Path::new("/usr/bin/python3.12"));
        store.remove();
        store.write(&sample()).unwrap();
        store.remove();
        assert!(!store.exists());
    }
}
