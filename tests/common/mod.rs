//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = DataFixture::new().with_definition("ipfs", definitions::MINIMAL);
//! let mut request = Request::new("ipfs").with_paths(fixture.host_path("src"), "/data");
//! fixture.manager().import(&mut request).unwrap();
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use datavol::config::Settings;
use datavol::definitions::YamlDefinitionLoader;
use datavol::manager::DataManager;
use datavol::memory::{Faults, MemoryEngine};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::definitions;
    #[allow(unused_imports)]
    pub use super::DataFixture;
    #[cfg(unix)]
    #[allow(unused_imports)]
    pub use super::fake_engine;
}

/// Data definition YAML snippets.
#[allow(dead_code)]
pub mod definitions {
    /// Only the image is set; everything else is defaulted.
    pub const MINIMAL: &str = "image: eris/data\n";

    /// Definition with user, environment and labels.
    pub const FULL: &str = r#"
image: eris/data:0.10
user: eris
env:
  - IPFS_PATH=/home/eris/.eris/ipfs
labels:
  team: storage
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "image: [unterminated";
}

/// A host workspace, definitions directory and in-memory engine wired into
/// a [`DataManager`].
///
/// Staging directories are created under a private root so tests can check
/// that none are left behind.
pub struct DataFixture {
    temp_dir: assert_fs::TempDir,
    engine: Arc<MemoryEngine>,
}

#[allow(dead_code)]
impl DataFixture {
    /// Create a fixture with an empty host workspace and no containers.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("staging")
            .create_dir_all()
            .expect("Failed to create staging root");
        temp_dir
            .child("host")
            .create_dir_all()
            .expect("Failed to create host workspace");
        Self {
            temp_dir,
            engine: Arc::new(MemoryEngine::new()),
        }
    }

    /// Store a data definition for `name`.
    pub fn with_definition(self, name: &str, content: &str) -> Self {
        self.temp_dir
            .child(format!("definitions/data/{}.yaml", name))
            .write_str(content)
            .expect("Failed to write definition");
        self
    }

    /// Add a file to the host workspace.
    pub fn with_host_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child("host")
            .child(path)
            .write_str(content)
            .expect("Failed to write host file");
        self
    }

    /// Inject engine faults.
    pub fn with_faults(self, faults: Faults) -> Self {
        self.engine.set_faults(faults);
        self
    }

    /// Settings pointing at this fixture's directories.
    pub fn settings(&self) -> Settings {
        Settings {
            definitions_dir: self.temp_dir.path().join("definitions"),
            staging_root: Some(self.staging_root()),
            pipe_capacity: 4,
            ..Settings::default()
        }
    }

    /// A manager over the in-memory engine and YAML definitions.
    pub fn manager(&self) -> DataManager {
        let settings = self.settings();
        let loader = YamlDefinitionLoader::new(&settings);
        DataManager::with_operations(Box::new(self.engine.clone()), Box::new(loader), settings)
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Path inside the host workspace.
    pub fn host_path(&self, path: &str) -> PathBuf {
        self.temp_dir.path().join("host").join(path)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.temp_dir.path().join("staging")
    }

    /// Whether every staging directory has been cleaned up.
    pub fn staging_is_clean(&self) -> bool {
        std::fs::read_dir(self.staging_root())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a settings file pointing at this fixture's directories.
    pub fn settings_file(&self) -> PathBuf {
        let path = self.temp_dir.path().join("config.yaml");
        let settings = self.settings();
        let yaml = serde_yaml::to_string(&settings).expect("Failed to serialize settings");
        std::fs::write(&path, yaml).expect("Failed to write settings file");
        path
    }

    /// A `datavol` command using this fixture's settings file.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("datavol");
        cmd.current_dir(self.path())
            .env_remove("DATAVOL_CONFIG")
            .env_remove("DATAVOL_ENGINE")
            .env("NO_COLOR", "1")
            .arg("--config")
            .arg(self.settings_file());
        cmd
    }
}

/// Write an executable shell script standing in for the engine binary.
///
/// `body` is the script after the shebang; `$1` is the engine subcommand.
#[cfg(unix)]
#[allow(dead_code)]
pub fn fake_engine(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-engine");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write fake engine");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake engine executable");
    path
}

impl Default for DataFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_layout() {
        let fixture = DataFixture::new()
            .with_definition("ipfs", definitions::MINIMAL)
            .with_host_file("src/x.txt", "x");
        assert!(fixture.host_path("src/x.txt").exists());
        assert!(fixture.path().join("definitions/data/ipfs.yaml").exists());
        assert!(fixture.staging_is_clean());
    }
}
