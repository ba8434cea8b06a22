//! # Data Container Definitions
//!
//! A data definition is the [`Operations`] descriptor a data container is
//! created from. The core only consumes definitions through the
//! [`DefinitionLoader`] trait, so callers embedding the library can source
//! them from anywhere.
//!
//! [`YamlDefinitionLoader`] is the default: it reads an optional
//! `<definitions_dir>/data/<name>.yaml` file and fills in whatever the file
//! leaves out. The canonical container name, type and number are always
//! derived, never taken from the file.
//!
//! ```yaml
//! # ~/.config/datavol/definitions/data/ipfs.yaml
//! image: eris/data:0.10
//! user: eris
//! env:
//!   - IPFS_PATH=/home/eris/.eris/ipfs
//! labels:
//!   team: storage
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::operations::{ContainerType, Operations};

/// Source of stored data container definitions
pub trait DefinitionLoader: Send + Sync {
    /// Produce the definition for instance `number` of `name`
    fn load_data_definition(&self, name: &str, number: u32) -> Result<Operations>;
}

/// Loads definitions from YAML files under a definitions directory
#[derive(Debug, Clone)]
pub struct YamlDefinitionLoader {
    definitions_dir: PathBuf,
    name_prefix: String,
    default_image: String,
}

impl YamlDefinitionLoader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            definitions_dir: settings.definitions_dir.clone(),
            name_prefix: settings.name_prefix.clone(),
            default_image: settings.data_image.clone(),
        }
    }

    /// Path of the definition file for `name`
    pub fn definition_path(&self, name: &str) -> PathBuf {
        self.definitions_dir.join("data").join(format!("{}.yaml", name))
    }

    fn read_file(path: &Path) -> Result<Operations> {
        let content = fs::read_to_string(path).map_err(|e| Error::Definition {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Ok(Operations::default());
        }
        serde_yaml::from_str(&content).map_err(|e| Error::Definition {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl DefinitionLoader for YamlDefinitionLoader {
    fn load_data_definition(&self, name: &str, number: u32) -> Result<Operations> {
        crate::naming::validate_name(name)?;

        let path = self.definition_path(name);
        let mut ops = if path.exists() {
            log::debug!("Loading data definition from {}", path.display());
            Self::read_file(&path)?
        } else {
            Operations::default()
        };

        ops.container_number = Some(number);
        ops.container_type = Some(ContainerType::Data);
        ops.data_container_name = Some(crate::naming::data_container_name(
            &self.name_prefix,
            name,
            number,
        ));
        if ops.image.is_none() {
            ops.image = Some(self.default_image.clone());
        }

        let prefix = &self.name_prefix;
        ops.labels
            .entry(format!("{}.name", prefix))
            .or_insert_with(|| name.to_string());
        ops.labels
            .entry(format!("{}.number", prefix))
            .or_insert_with(|| number.to_string());
        ops.labels
            .entry(format!("{}.type", prefix))
            .or_insert_with(|| ContainerType::Data.to_string());

        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader(dir: &Path) -> YamlDefinitionLoader {
        let settings = Settings {
            definitions_dir: dir.to_path_buf(),
            ..Settings::default()
        };
        YamlDefinitionLoader::new(&settings)
    }

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let ops = loader(temp_dir.path()).load_data_definition("ipfs", 2).unwrap();

        assert_eq!(ops.data_container_name.as_deref(), Some("eris_data_ipfs_2"));
        assert_eq!(ops.container_type, Some(ContainerType::Data));
        assert_eq!(ops.container_number, Some(2));
        assert_eq!(ops.image.as_deref(), Some("eris/data"));
        assert_eq!(ops.labels.get("eris.name").map(String::as_str), Some("ipfs"));
        assert_eq!(ops.labels.get("eris.number").map(String::as_str), Some("2"));
        assert_eq!(ops.labels.get("eris.type").map(String::as_str), Some("data"));
    }

    #[test]
    fn test_file_values_are_kept() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(
            data_dir.join("keys.yaml"),
            "image: eris/keys-data\nuser: eris\nlabels:\n  team: security\n",
        )
        .unwrap();

        let ops = loader(temp_dir.path()).load_data_definition("keys", 1).unwrap();
        assert_eq!(ops.image.as_deref(), Some("eris/keys-data"));
        assert_eq!(ops.user.as_deref(), Some("eris"));
        assert_eq!(ops.labels.get("team").map(String::as_str), Some("security"));
        assert_eq!(ops.labels.get("eris.name").map(String::as_str), Some("keys"));
    }

    #[test]
    fn test_canonical_name_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("keys.yaml"), "data_container_name: invented\n").unwrap();

        let ops = loader(temp_dir.path()).load_data_definition("keys", 1).unwrap();
        assert_eq!(ops.data_container_name.as_deref(), Some("eris_data_keys_1"));
    }

    #[test]
    fn test_invalid_yaml_is_a_definition_error() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("bad.yaml"), "image: [unclosed").unwrap();

        let err = loader(temp_dir.path()).load_data_definition("bad", 1).unwrap_err();
        assert!(matches!(err, Error::Definition { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = loader(temp_dir.path())
            .load_data_definition("../escape", 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }
}
