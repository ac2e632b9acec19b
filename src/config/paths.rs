//! Path management for vaultkeep
//!
//! ## Path Resolution Order
//!
//! 1. `VAULTKEEP_DATA_DIR` environment variable (if set)
//! 2. The platform data directory reported by `directories`
//!    (e.g. `~/.local/share/vaultkeep` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::VaultError;

/// Manages all paths used by vaultkeep
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all vaultkeep data
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Resolve the base directory
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, VaultError> {
        let base_dir = if let Ok(custom) = std::env::var("VAULTKEEP_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "vaultkeep")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    VaultError::Config("Could not determine a data directory".into())
                })?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Audit log (JSONL)
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Key-value data store read and written by the secure storage facade
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join("store.json")
    }

    /// Key registry (key metadata and material)
    pub fn keys_file(&self) -> PathBuf {
        self.base_dir.join("keys.json")
    }

    /// Ensure the base directory exists
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| VaultError::Io(format!("Failed to create base directory: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(paths.store_file(), temp_dir.path().join("store.json"));
        assert_eq!(paths.keys_file(), temp_dir.path().join("keys.json"));
        assert_eq!(paths.audit_log(), temp_dir.path().join("audit.log"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().join("nested").join("vault"));

        paths.ensure_directories().unwrap();
        assert!(paths.base_dir().exists());
    }
}
