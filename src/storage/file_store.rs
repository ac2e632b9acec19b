//! JSON file backed key-value store
//!
//! Keeps the whole map in memory and rewrites the file atomically on every
//! mutation, so each `set`/`remove` is durable once it returns.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};

use super::store::KeyValueStore;

type Entries = BTreeMap<String, String>;

/// Persistent store backed by a single JSON object file
pub struct FileStore {
    path: PathBuf,
    data: RwLock<Entries>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries if the file exists
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let data = load_entries(&path)?;

        tracing::debug!(path = %path.display(), entries = data.len(), "opened file store");

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a mutation and persist it; the in-memory map only changes if
    /// the write succeeded
    fn mutate<F>(&self, f: F) -> VaultResult<()>
    where
        F: FnOnce(&mut Entries),
    {
        let mut data = self
            .data
            .write()
            .map_err(|_| VaultError::lock_poisoned("file store write"))?;

        let mut next = data.clone();
        f(&mut next);
        save_entries(&self.path, &next)?;
        *data = next;

        Ok(())
    }
}

/// A missing file is an empty store; anything unreadable is an error
fn load_entries(path: &Path) -> VaultResult<Entries> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => {
            return Err(VaultError::Storage(format!(
                "Cannot read store {}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_str(&contents).map_err(|e| {
        VaultError::Storage(format!("Store {} is not a JSON object: {}", path.display(), e))
    })
}

/// Replace the store file via a synced sibling temp file and a rename
fn save_entries(path: &Path, entries: &Entries) -> VaultResult<()> {
    let storage_err = |what: &str, e: std::io::Error| {
        VaultError::Storage(format!("{} for {}: {}", what, path.display(), e))
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| storage_err("Cannot create directory", e))?;
    }

    let staging = path.with_extension("json.tmp");
    let file = File::create(&staging).map_err(|e| storage_err("Cannot stage write", e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, entries)
        .map_err(|e| VaultError::Storage(format!("Cannot encode store: {}", e)))?;
    writer
        .flush()
        .and_then(|_| writer.get_ref().sync_all())
        .map_err(|e| storage_err("Cannot flush staged write", e))?;

    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(storage_err("Cannot replace store", e));
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let data = self
            .data
            .read()
            .map_err(|_| VaultError::lock_poisoned("file store read"))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        self.mutate(|data| {
            data.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        self.mutate(|data| {
            data.remove(key);
        })
    }

    fn clear(&self) -> VaultResult<()> {
        self.mutate(|data| data.clear())
    }

    fn list_keys(&self) -> VaultResult<Vec<String>> {
        let data = self
            .data
            .read()
            .map_err(|_| VaultError::lock_poisoned("file store read"))?;
        Ok(data.keys().cloned().collect())
    }
}
