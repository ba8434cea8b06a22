//! # Error Handling
//!
//! This module defines the centralized error type for `datavol`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! the data-container core can report, with enough context (operation, path,
//! container identity) for a caller to act on.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all failures. Variants map onto the failure
//!   classes of the subsystem:
//!   - not-found errors (export/exec against a missing data container),
//!   - provisioning errors (definition load or container creation during the
//!     import self-heal),
//!   - transfer errors (archive upload/download),
//!   - filesystem errors (staging, destination creation, copy, removal),
//!   - remediation errors (the ownership fix after an import).
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Nothing in the library is fatal to the process; every failure is returned
//! to the caller.

use std::path::Path;

use thiserror::Error;

/// Main error type for data container operations
#[derive(Error, Debug)]
pub enum Error {
    /// The requested data container does not exist.
    ///
    /// Returned by export and exec, which never auto-provision.
    #[error("No data container {container} exists for '{name}'\n  hint: import data first or check the name with `datavol exists {name}`")]
    NotFound { name: String, container: String },

    /// Loading the definition or creating the container failed while
    /// provisioning a missing data container.
    #[error("Error creating data container {container}: {message}")]
    Provisioning { container: String, message: String },

    /// The container was created but still cannot be resolved.
    #[error("Data container {container} is still missing after it was created")]
    StillMissing { container: String },

    /// An archive upload or download failed.
    #[error("Transfer error ({operation}) for {container}:{path}: {message}")]
    Transfer {
        operation: String,
        container: String,
        path: String,
        message: String,
    },

    /// The ownership fix after an import failed.
    #[error("Error changing owner of {path} in {container}: {message}")]
    Remediation {
        container: String,
        path: String,
        message: String,
    },

    /// A command run in the data container exited unsuccessfully.
    #[error("Command in data container {container} exited with status {code}")]
    Exec { container: String, code: i64 },

    /// The engine client reported an error.
    #[error("Container engine error: {message}")]
    Engine { message: String },

    /// An engine command-line invocation failed.
    #[error("Engine command failed: {command} - {stderr}")]
    EngineCommand { command: String, stderr: String },

    /// A host filesystem operation failed.
    #[error("Filesystem error ({operation}) at {path}: {message}")]
    Filesystem {
        operation: String,
        path: String,
        message: String,
    },

    /// A path argument was unusable.
    #[error("Path operation error: {message}")]
    Path { message: String },

    /// A logical name cannot be turned into a container name.
    #[error("Invalid data container name '{name}': names must start with a letter or digit and contain only [a-zA-Z0-9_.-]")]
    InvalidName { name: String },

    /// The request is missing something required.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// A stored data definition could not be read.
    #[error("Definition error in {path}: {message}")]
    Definition { path: String, message: String },

    /// The configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The operation was cancelled or ran past its deadline.
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Build a `Filesystem` error from an I/O failure at `path`.
    pub fn filesystem(operation: &str, path: &Path, err: std::io::Error) -> Self {
        Error::Filesystem {
            operation: operation.to_string(),
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
