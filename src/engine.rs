//! # Container Engine Contract
//!
//! The data-container core never talks to a container runtime directly. It
//! goes through the narrow [`Engine`] trait below, which covers exactly the
//! capabilities the core needs: look a container up, create one, move an
//! archive in or out of it, and run a command against it.
//!
//! The production implementation is [`DockerCli`](crate::docker::DockerCli).
//! Tests substitute in-memory engines to simulate missing containers,
//! transfer failures, and failing commands without a daemon.
//!
//! Every call is blocking. Streaming calls take a [`Cancellation`] so a hung
//! engine can be abandoned once the caller's deadline passes.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::Result;
use crate::operations::Operations;
use crate::pipe::Cancellation;

/// Engine-assigned identity of an existing container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Engine-assigned container ID
    pub id: String,
    /// Canonical container name
    pub name: String,
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// What to look a container up by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSelector {
    /// Exact canonical container name
    pub name: String,
}

impl ContainerSelector {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Operations the data-container core needs from a container engine
pub trait Engine: Send + Sync {
    /// Look up a container.
    ///
    /// `Ok(None)` means the engine confirmed the container is absent. A
    /// failed query must be an `Err`, never `Ok(None)`.
    fn container_exists(&self, selector: &ContainerSelector) -> Result<Option<ContainerHandle>>;

    /// Create a container from a data definition
    fn create_container(&self, definition: &Operations) -> Result<ContainerHandle>;

    /// Extract the tar stream `archive` into the container at `path`.
    ///
    /// With `no_overwrite_dir_non_dir` set, the engine must fail the whole
    /// transfer rather than replace a directory with a non-directory or the
    /// other way round.
    fn upload_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        archive: &mut dyn Read,
        no_overwrite_dir_non_dir: bool,
        cancel: &Cancellation,
    ) -> Result<()>;

    /// Write a tar stream of `path` inside the container to `out`.
    ///
    /// Archive entries are rooted at the base name of `path`.
    fn download_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        out: &mut dyn Write,
        cancel: &Cancellation,
    ) -> Result<()>;

    /// Run `run.args` against the container and return its exit status
    fn run_in_container(&self, container: &ContainerHandle, run: &Operations) -> Result<i64>;
}

impl<T: Engine + ?Sized> Engine for Arc<T> {
    fn container_exists(&self, selector: &ContainerSelector) -> Result<Option<ContainerHandle>> {
        (**self).container_exists(selector)
    }

    fn create_container(&self, definition: &Operations) -> Result<ContainerHandle> {
        (**self).create_container(definition)
    }

    fn upload_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        archive: &mut dyn Read,
        no_overwrite_dir_non_dir: bool,
        cancel: &Cancellation,
    ) -> Result<()> {
        (**self).upload_archive(container, path, archive, no_overwrite_dir_non_dir, cancel)
    }

    fn download_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        out: &mut dyn Write,
        cancel: &Cancellation,
    ) -> Result<()> {
        (**self).download_archive(container, path, out, cancel)
    }

    fn run_in_container(&self, container: &ContainerHandle, run: &Operations) -> Result<i64> {
        (**self).run_in_container(container, run)
    }
}
