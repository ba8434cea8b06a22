//! # Configuration
//!
//! `Settings` holds everything the data-container core needs that is not part
//! of an individual request: which engine binary to drive, how canonical names
//! are prefixed, the image and owner used for data containers, and the knobs of
//! the streaming pipelines.
//!
//! Settings are read from a YAML file. A missing file is not an error; every
//! key has a default (see [`crate::defaults`]). Command-line flags are applied
//! on top by the binary.
//!
//! ```yaml
//! engine: podman
//! name_prefix: eris
//! data_image: eris/data:0.10
//! owner: eris
//! compression: 6
//! timeout_secs: 600
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Configuration for data container operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Engine binary to invoke
    pub engine: String,
    /// Prefix of canonical data container names
    pub name_prefix: String,
    /// Image data containers are created from
    pub data_image: String,
    /// Identity that imported files are handed to
    pub owner: String,
    /// Hidden directory exported archives may be nested under
    pub nested_dir: String,
    /// Gzip level for import archives; 0 sends a plain tar
    pub compression: u32,
    /// Directory holding `data/<name>.yaml` definitions
    pub definitions_dir: PathBuf,
    /// Where export staging directories are created; OS temp dir when unset
    pub staging_root: Option<PathBuf>,
    /// Chunks buffered in a streaming pipe
    pub pipe_capacity: usize,
    /// Deadline for a single streaming transfer
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: defaults::ENGINE.to_string(),
            name_prefix: defaults::NAME_PREFIX.to_string(),
            data_image: defaults::DATA_IMAGE.to_string(),
            owner: defaults::OWNER.to_string(),
            nested_dir: defaults::NESTED_DIR.to_string(),
            compression: 0,
            definitions_dir: defaults::default_definitions_dir(),
            staging_root: None,
            pipe_capacity: defaults::PIPE_CAPACITY,
            timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    /// Parse settings from YAML text and validate them
    pub fn parse(content: &str) -> Result<Self> {
        // An empty or comment-only file deserializes to unit, not a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Settings = serde_yaml::from_str(content).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipelines cannot use
    pub fn validate(&self) -> Result<()> {
        if self.compression > 9 {
            return Err(Error::Config {
                message: format!("compression must be between 0 and 9, got {}", self.compression),
            });
        }
        if self.pipe_capacity == 0 {
            return Err(Error::Config {
                message: "pipe_capacity must be at least 1".to_string(),
            });
        }
        if self.engine.trim().is_empty() {
            return Err(Error::Config {
                message: "engine must not be empty".to_string(),
            });
        }
        crate::naming::validate_name(&self.name_prefix).map_err(|_| Error::Config {
            message: format!("name_prefix '{}' is not a valid container name prefix", self.name_prefix),
        })?;
        Ok(())
    }

    /// Deadline for one streaming transfer, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Canonical container name for `(name, number)` under this prefix
    pub fn container_name(&self, name: &str, number: u32) -> String {
        crate::naming::data_container_name(&self.name_prefix, name, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load(&temp_dir.path().join("nope.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "engine: podman\ncompression: 6\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.engine, "podman");
        assert_eq!(settings.compression, 6);
        assert_eq!(settings.owner, defaults::OWNER);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        assert_eq!(Settings::parse("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_rejects_out_of_range_compression() {
        let err = Settings::parse("compression: 11\n").unwrap_err();
        assert!(err.to_string().contains("compression"));
    }

    #[test]
    fn test_rejects_zero_pipe_capacity() {
        assert!(Settings::parse("pipe_capacity: 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = Settings::parse("enigne: docker\n").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(Settings::parse("name_prefix: 'has space'\n").is_err());
    }

    #[test]
    fn test_timeout() {
        let settings = Settings::parse("timeout_secs: 30\n").unwrap();
        assert_eq!(settings.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(Settings::default().timeout(), None);
    }

    #[test]
    fn test_container_name_uses_prefix() {
        let settings = Settings::parse("name_prefix: acme\n").unwrap();
        assert_eq!(settings.container_name("ipfs", 2), "acme_data_ipfs_2");
    }
}
