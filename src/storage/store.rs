//! Underlying key-value stores
//!
//! [`KeyValueStore`] is the contract the secure storage facade and the key
//! registry persist through: string keys, string values, enumerable keys.
//! Every call is a single synchronous operation; implementations provide
//! their own atomicity per call.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};

/// A synchronous string-keyed store
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value, `None` when the key is absent
    fn get(&self, key: &str) -> VaultResult<Option<String>>;

    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &str) -> VaultResult<()>;

    /// Delete a value; deleting an absent key is not an error
    fn remove(&self, key: &str) -> VaultResult<()>;

    /// Delete every value
    fn clear(&self) -> VaultResult<()>;

    /// All keys currently present
    fn list_keys(&self) -> VaultResult<Vec<String>>;
}

/// Volatile in-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let data = self
            .data
            .read()
            .map_err(|_| VaultError::lock_poisoned("memory store read"))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| VaultError::lock_poisoned("memory store write"))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| VaultError::lock_poisoned("memory store write"))?;
        data.remove(key);
        Ok(())
    }

    fn clear(&self) -> VaultResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| VaultError::lock_poisoned("memory store write"))?;
        data.clear();
        Ok(())
    }

    fn list_keys(&self) -> VaultResult<Vec<String>> {
        let data = self
            .data
            .read()
            .map_err(|_| VaultError::lock_poisoned("memory store read"))?;
        Ok(data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        // removing again is fine
        store.remove("a").unwrap();
    }

    #[test]
    fn test_list_and_clear() {
        let store = MemoryStore::new();
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["a", "b"]);
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
