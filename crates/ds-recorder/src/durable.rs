// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-reset key-value store.
//!
//! Only touched at startup and when the packet-processing state is
//! commanded.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Key holding the packet-processing enable state.
pub const APP_ENABLE_STATE_KEY: &str = "ds.app_enable_state";

/// Durable key-value store.
pub trait DurableStore {
    /// Value stored under `key`, if any.
    fn load(&self, key: &str) -> io::Result<Option<String>>;

    /// Store `value` under `key`.
    fn save(&mut self, key: &str, value: &str) -> io::Result<()>;
}

/// JSON object in a single file, rewritten atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> io::Result<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&mut self, key: &str, value: &str) -> io::Result<()> {
        // A corrupt file is replaced.
        let mut values = match self.read_all() {
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(path = %self.path.display(), "replacing corrupt state file: {}", e);
                BTreeMap::new()
            }
            other => other?,
        };
        values.insert(key.to_string(), value.to_string());

        let json = serde_json::to_vec_pretty(&values)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

/// In-memory store (for testing).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
    fail_save: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `save` fail.
    pub fn fail_save(&mut self, fail: bool) {
        self.fail_save = fail;
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> io::Result<()> {
        if self.fail_save {
            return Err(io::Error::new(io::ErrorKind::Other, "injected save failure"));
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert_eq!(store.load(APP_ENABLE_STATE_KEY).expect("load"), None);
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let mut store = JsonFileStore::new(&path);
        store.save(APP_ENABLE_STATE_KEY, "false").expect("save");
        store.save("other", "1").expect("save");

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.load(APP_ENABLE_STATE_KEY).expect("load").as_deref(),
            Some("false")
        );
        assert_eq!(reopened.load("other").expect("load").as_deref(), Some("1"));
    }

    #[test]
    fn test_json_store_corrupt_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").expect("seed");

        let store = JsonFileStore::new(&path);
        assert!(store.load(APP_ENABLE_STATE_KEY).is_err());
    }

    #[test]
    fn test_json_store_save_replaces_corrupt_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").expect("seed");

        let mut store = JsonFileStore::new(&path);
        store.save(APP_ENABLE_STATE_KEY, "false").expect("save");
        assert_eq!(
            store.load(APP_ENABLE_STATE_KEY).expect("load").as_deref(),
            Some("false")
        );
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        store.save("k", "v").expect("save");
        assert_eq!(store.load("k").expect("load").as_deref(), Some("v"));

        store.fail_save(true);
        assert!(store.save("k", "w").is_err());
        assert_eq!(store.load("k").expect("load").as_deref(), Some("v"));
    }
}
