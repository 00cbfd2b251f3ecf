//! Store configuration
//!
//! A store is described by a directory, a file name, and the byte cap the
//! backing file must never exceed. Configuration can be built in code or
//! loaded from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{FILE_HEADER_SIZE, SLOT_HEADER_SIZE};

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_sync_writes() -> bool {
    true
}

/// Configuration for a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the backing file; created if missing.
    pub directory: PathBuf,
    /// Backing file name within `directory`.
    pub filename: String,
    /// Hard ceiling on the backing file size, fixed at creation.
    pub max_size_bytes: u64,
    /// Whether every put fsyncs before returning. Defaults to true;
    /// disabling trades durability for throughput.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

impl StoreConfig {
    /// Creates a config with synchronous writes enabled.
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>, max_size_bytes: u64) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
            max_size_bytes,
            sync_writes: true,
        }
    }

    /// Returns the full path of the backing file.
    pub fn store_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Loads a config from a JSON file.
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// The cap must leave room for the file header plus at least one
    /// single-byte record; the file name must be a plain name, not a path.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.filename.is_empty() {
            return Err(ConfigError::Invalid("filename must not be empty".into()));
        }
        if self.filename.contains('/') || self.filename.contains('\\') {
            return Err(ConfigError::Invalid(format!(
                "filename must not contain path separators: {}",
                self.filename
            )));
        }
        let min_size = FILE_HEADER_SIZE + SLOT_HEADER_SIZE + 1;
        if self.max_size_bytes < min_size {
            return Err(ConfigError::Invalid(format!(
                "max_size_bytes {} below minimum {}",
                self.max_size_bytes, min_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_config_defaults_to_sync_writes() {
        let config = StoreConfig::new("/tmp/capstore", "records.dat", 1 << 20);
        assert!(config.sync_writes);
        assert_eq!(config.max_size_bytes, 1 << 20);
    }

    #[test]
    fn test_store_path() {
        let config = StoreConfig::new("/data", "records.dat", 1 << 20);
        assert_eq!(config.store_path(), PathBuf::from("/data/records.dat"));
    }

    #[test]
    fn test_validate_rejects_empty_filename() {
        let config = StoreConfig::new("/data", "", 1 << 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_path_in_filename() {
        let config = StoreConfig::new("/data", "nested/records.dat", 1 << 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_cap() {
        let config = StoreConfig::new("/data", "records.dat", FILE_HEADER_SIZE);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_minimum_cap() {
        let config =
            StoreConfig::new("/data", "records.dat", FILE_HEADER_SIZE + SLOT_HEADER_SIZE + 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = StoreConfig::new("/data", "records.dat", 4096);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.filename, "records.dat");
        assert_eq!(parsed.max_size_bytes, 4096);
        assert!(parsed.sync_writes);
    }

    #[test]
    fn test_sync_writes_defaults_when_absent_in_json() {
        let json = r#"{"directory":"/data","filename":"records.dat","max_size_bytes":4096}"#;
        let parsed: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(parsed.sync_writes);
    }

    #[test]
    fn test_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("store.json");
        fs::write(
            &config_path,
            r#"{"directory":"/data","filename":"records.dat","max_size_bytes":8192,"sync_writes":false}"#,
        )
        .unwrap();

        let config = StoreConfig::from_json_file(&config_path).unwrap();
        assert_eq!(config.max_size_bytes, 8192);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("store.json");
        fs::write(
            &config_path,
            r#"{"directory":"/data","filename":"","max_size_bytes":8192}"#,
        )
        .unwrap();

        assert!(StoreConfig::from_json_file(&config_path).is_err());
    }
}
