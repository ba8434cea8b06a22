//! Default values for datavol configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Engine binary used when none is configured
pub const ENGINE: &str = "docker";

/// Prefix of every canonical data container name
pub const NAME_PREFIX: &str = "eris";

/// Image data containers are created from
pub const DATA_IMAGE: &str = "eris/data";

/// Identity that owns imported data inside the container
pub const OWNER: &str = "eris";

/// Hidden directory the engine may nest exported content under
pub const NESTED_DIR: &str = ".eris";

/// Chunks buffered between a streaming producer and its consumer
pub const PIPE_CAPACITY: usize = 16;

/// Returns the default configuration directory.
///
/// Uses the platform-appropriate configuration directory:
/// - Linux: `~/.config/datavol` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/datavol`
/// - Windows: `{FOLDERID_RoamingAppData}\datavol`
///
/// Falls back to `.datavol` in the current directory if the platform
/// configuration directory cannot be determined.
pub fn default_config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".datavol"))
        .join("datavol")
}

/// Returns the default configuration file path.
///
/// This can be overridden by the `--config` CLI flag or the
/// `DATAVOL_CONFIG` environment variable.
pub fn default_config_file() -> PathBuf {
    default_config_root().join("config.yaml")
}

/// Returns the default directory holding stored data definitions.
pub fn default_definitions_dir() -> PathBuf {
    default_config_root().join("definitions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_root_returns_path() {
        let root = default_config_root();
        assert!(root.ends_with("datavol"));
    }

    #[test]
    fn test_default_config_file_is_under_root() {
        let file = default_config_file();
        assert!(file.starts_with(default_config_root()));
        assert!(file.ends_with("config.yaml"));
    }

    #[test]
    fn test_default_definitions_dir_is_under_root() {
        assert!(default_definitions_dir().starts_with(default_config_root()));
    }
}
