//! # Data Container Manager
//!
//! [`DataManager`] is the entry point for everything that touches a data
//! container: resolving whether it exists, importing a host directory into it,
//! exporting its contents back to the host, and running commands against it.
//!
//! ## Design
//!
//! The manager is built around two traits that keep it independent of any
//! particular runtime or definition store:
//!
//! - **[`Engine`]**: the container engine (look up, create, upload, download,
//!   run). [`DockerCli`] is used by default.
//! - **[`DefinitionLoader`]**: where data definitions come from.
//!   [`YamlDefinitionLoader`] is used by default.
//!
//! Both can be swapped through [`DataManager::with_operations`], which is how
//! the tests drive the pipelines against an in-memory engine.
//!
//! ## Entry points
//!
//! - **Import** resolves the container and, when it is missing, provisions it
//!   from its definition and resolves again. Provisioning happens at most once
//!   per call; a container that is still missing afterwards is an error.
//! - **Export** and **Exec** never provision. A missing container is a user
//!   error reported immediately.
//!
//! Existence is never cached: every call asks the engine again.
//!
//! ## Streaming
//!
//! Import and export each run two parties joined by a bounded
//! [`pipe`](crate::pipe::pipe): a scoped producer thread and the calling
//! thread. Import archives the host directory on the producer while the
//! engine uploads from the pipe. Export lets the engine download into the
//! pipe on the producer while the calling thread unpacks into a staging
//! directory. Neither side ever holds the whole archive.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;
use std::thread;

use log::{debug, info, warn};

use crate::archive;
use crate::config::Settings;
use crate::definitions::{DefinitionLoader, YamlDefinitionLoader};
use crate::docker::DockerCli;
use crate::engine::{ContainerHandle, ContainerSelector, Engine};
use crate::error::{Error, Result};
use crate::naming;
use crate::operations::{ContainerType, Operations, Outcome, Request};
use crate::pipe::{pipe, Cancellation};
use crate::transfer::flatten_merge;

/// Identity the ownership fix runs as
const REMEDIATION_USER: &str = "root";

/// Instance number of the auxiliary container that runs the ownership fix
const REMEDIATION_CONTAINER_NUMBER: u32 = 1;

/// Orchestrates data container lifecycle and transfers
pub struct DataManager {
    engine: Box<dyn Engine>,
    loader: Box<dyn DefinitionLoader>,
    settings: Settings,
}

impl DataManager {
    /// Creates a `DataManager` driving the configured engine binary and
    /// reading definitions from the configured directory.
    pub fn new(settings: Settings) -> Self {
        Self {
            engine: Box::new(DockerCli::new(&settings.engine, &settings.data_image)),
            loader: Box::new(YamlDefinitionLoader::new(&settings)),
            settings,
        }
    }

    /// Creates a `DataManager` with custom `Engine` and `DefinitionLoader`
    /// implementations.
    pub fn with_operations(
        engine: Box<dyn Engine>,
        loader: Box<dyn DefinitionLoader>,
        settings: Settings,
    ) -> Self {
        Self {
            engine,
            loader,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A cancellation token carrying the configured transfer deadline
    pub fn cancellation(&self) -> Cancellation {
        Cancellation::from_timeout(self.settings.timeout())
    }

    /// Canonical container name for instance `number` of `name`
    pub fn container_name(&self, name: &str, number: u32) -> Result<String> {
        naming::validate_name(name)?;
        Ok(self.settings.container_name(name, number))
    }

    /// Whether the data container for `(name, number)` exists.
    ///
    /// An engine failure is returned as an error, never as `false`.
    pub fn exists(&self, name: &str, number: u32) -> Result<bool> {
        Ok(self.resolve(name, number)?.is_some())
    }

    /// Look up the data container for `(name, number)`
    pub fn resolve(&self, name: &str, number: u32) -> Result<Option<ContainerHandle>> {
        let container = self.container_name(name, number)?;
        let found = self
            .engine
            .container_exists(&ContainerSelector::by_name(&container))?;
        debug!("Resolved {}: {}", container, if found.is_some() { "present" } else { "absent" });
        Ok(found)
    }

    /// Import `request.source` (host) into `request.destination` (container).
    ///
    /// See [`import_with`](Self::import_with).
    pub fn import(&self, request: &mut Request) -> Result<()> {
        self.import_with(request, &self.cancellation())
    }

    /// Import with an explicit cancellation token.
    ///
    /// A missing container is created from its definition and resolved once
    /// more. After the upload, ownership of the destination is handed to the
    /// configured owner. `request.result` is only set when every step
    /// succeeded.
    pub fn import_with(&self, request: &mut Request, cancel: &Cancellation) -> Result<()> {
        let container = self.container_name(&request.name, request.instance_number)?;
        let destination = container_path(&request.destination)?;
        let source = request.source.clone();
        if !source.is_dir() {
            return Err(Error::Filesystem {
                operation: "read source".to_string(),
                path: source.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let mut provisioned = false;
        let handle = loop {
            match self.resolve(&request.name, request.instance_number)? {
                Some(handle) => break handle,
                None if provisioned => return Err(Error::StillMissing { container }),
                None => {
                    self.provision(&request.name, request.instance_number, &container)?;
                    provisioned = true;
                }
            }
        };
        request.operations.data_container_name = Some(container.clone());

        info!("Importing {} into {}:{}", source.display(), container, destination);
        self.upload(&handle, &source, &destination, cancel)?;
        self.remediate(&handle, &destination)?;

        request.result = Some(Outcome::Success);
        Ok(())
    }

    /// Export `request.source` (container) into `request.destination` (host).
    ///
    /// See [`export_with`](Self::export_with).
    pub fn export(&self, request: &mut Request) -> Result<()> {
        self.export_with(request, &self.cancellation())
    }

    /// Export with an explicit cancellation token.
    ///
    /// The archive is unpacked into a fresh staging directory while it
    /// streams. If the engine nested the content under a single root
    /// directory, that root is lifted, then everything is merged into the
    /// destination, which is created when missing. The staging directory is
    /// removed on every path.
    pub fn export_with(&self, request: &mut Request, cancel: &Cancellation) -> Result<()> {
        let container = self.container_name(&request.name, request.instance_number)?;
        let source = container_path(&request.source)?;
        let handle = self
            .resolve(&request.name, request.instance_number)?
            .ok_or_else(|| Error::NotFound {
                name: request.name.clone(),
                container: container.clone(),
            })?;
        request.operations.data_container_name = Some(container.clone());

        info!("Exporting {}:{} to {}", container, source, request.destination.display());
        let staging = self.staging_dir(&request.name)?;
        debug!("Staging export in {}", staging.path().display());

        self.download(&handle, &source, staging.path(), cancel)?;
        self.lift_nested_root(staging.path(), &source)?;

        let destination = &request.destination;
        if !destination.exists() {
            fs::create_dir_all(destination)
                .map_err(|e| Error::filesystem("create destination", destination, e))?;
        }
        flatten_merge(staging.path(), destination)?;

        request.result = Some(Outcome::Success);
        Ok(())
    }

    /// Run `request.operations.args` against the data container.
    ///
    /// The stored definition is loaded and the caller's operations are
    /// overlaid on it. Succeeds only when the command exits with status 0.
    pub fn exec(&self, request: &mut Request) -> Result<()> {
        let container = self.container_name(&request.name, request.instance_number)?;
        let handle = self
            .resolve(&request.name, request.instance_number)?
            .ok_or_else(|| Error::NotFound {
                name: request.name.clone(),
                container: container.clone(),
            })?;

        let mut ops = self
            .loader
            .load_data_definition(&request.name, request.instance_number)?;
        ops.overlay(&request.operations);
        ops.data_container_name = Some(container.clone());
        if ops.args.is_empty() {
            return Err(Error::InvalidRequest {
                message: "no command given to execute in the data container".to_string(),
            });
        }

        info!("Executing `{}` in data container {}", ops.args.join(" "), container);
        let code = self.engine.run_in_container(&handle, &ops)?;
        if code != 0 {
            return Err(Error::Exec { container, code });
        }

        request.operations.data_container_name = Some(container);
        request.result = Some(Outcome::Success);
        Ok(())
    }

    /// Create the data container from its stored definition
    fn provision(&self, name: &str, number: u32, container: &str) -> Result<()> {
        info!("No data container {}, creating it", container);
        let definition = self
            .loader
            .load_data_definition(name, number)
            .map_err(|e| Error::Provisioning {
                container: container.to_string(),
                message: e.to_string(),
            })?;
        let handle = self
            .engine
            .create_container(&definition)
            .map_err(|e| Error::Provisioning {
                container: container.to_string(),
                message: e.to_string(),
            })?;
        debug!("Created {}", handle);
        Ok(())
    }

    /// Stream `source` into the container at `destination`
    fn upload(
        &self,
        handle: &ContainerHandle,
        source: &Path,
        destination: &str,
        cancel: &Cancellation,
    ) -> Result<()> {
        let (mut writer, mut reader) = pipe(self.settings.pipe_capacity, cancel.clone());
        let compression = self.settings.compression;

        let (uploaded, archived) = thread::scope(|s| {
            let producer = s.spawn(move || {
                let result = archive::stream_directory(source, &mut writer, compression);
                if let Err(e) = &result {
                    writer.fail(e);
                }
                result
            });

            info!("Copying into container {}", handle.name);
            let uploaded =
                self.engine
                    .upload_archive(handle, destination, &mut reader, true, cancel);
            // Unblocks the producer if the engine stopped reading early
            drop(reader);
            let archived = producer.join().unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::Other, "archive producer panicked"))
            });
            (uploaded, archived)
        });

        // The engine may stop reading once it has seen the end-of-archive
        // marker, so a closed pipe alone is not an archiving failure
        let archived = match archived {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        };
        // A deadline that passes after a clean transfer changes nothing
        if (uploaded.is_err() || archived.is_err()) && cancel.is_triggered() {
            return Err(Error::Cancelled {
                operation: format!("import into {}:{}", handle.name, destination),
            });
        }
        archived.map_err(|e| Error::filesystem("archive", source, e))?;
        uploaded.map_err(|e| Error::Transfer {
            operation: "upload".to_string(),
            container: handle.name.clone(),
            path: destination.to_string(),
            message: e.to_string(),
        })
    }

    /// Hand `destination` inside the container to the configured owner
    fn remediate(&self, handle: &ContainerHandle, destination: &str) -> Result<()> {
        let run = Operations {
            data_container_name: Some(handle.name.clone()),
            container_type: Some(ContainerType::Data),
            container_number: Some(REMEDIATION_CONTAINER_NUMBER),
            user: Some(REMEDIATION_USER.to_string()),
            args: vec![
                "chown".to_string(),
                "--recursive".to_string(),
                self.settings.owner.clone(),
                destination.to_string(),
            ],
            ..Default::default()
        };

        debug!("Changing owner of {}:{} to {}", handle.name, destination, self.settings.owner);
        let remediation_error = |message: String| Error::Remediation {
            container: handle.name.clone(),
            path: destination.to_string(),
            message,
        };
        match self.engine.run_in_container(handle, &run) {
            Ok(0) => Ok(()),
            Ok(code) => Err(remediation_error(format!("chown exited with status {}", code))),
            Err(e) => Err(remediation_error(e.to_string())),
        }
    }

    /// Stream `source` out of the container and unpack it into `staging`
    fn download(
        &self,
        handle: &ContainerHandle,
        source: &str,
        staging: &Path,
        cancel: &Cancellation,
    ) -> Result<()> {
        let (mut writer, mut reader) = pipe(self.settings.pipe_capacity, cancel.clone());

        let (downloaded, unpacked) = thread::scope(|s| {
            let producer = s.spawn(move || {
                info!("Copying out of container {}", handle.name);
                debug!("Source path {}", source);
                let result = self.engine.download_archive(handle, source, &mut writer, cancel);
                let reader_closed = writer.reader_closed();
                match &result {
                    Ok(()) => drop(writer),
                    Err(e) => writer.fail(&io::Error::new(io::ErrorKind::Other, e.to_string())),
                }
                (result, reader_closed)
            });

            debug!("Unpacking archive from {} into {}", handle.name, staging.display());
            // Drain past the end-of-archive marker so the producer never
            // sees a closed pipe on trailing padding
            let unpacked = archive::unpack(&mut reader, staging)
                .and_then(|()| io::copy(&mut reader, &mut io::sink()).map(|_| ()));
            drop(reader);
            let downloaded = producer.join().unwrap_or_else(|_| {
                let panicked = Error::Engine {
                    message: "download producer panicked".to_string(),
                };
                (Err(panicked), false)
            });
            (downloaded, unpacked)
        });
        let (downloaded, reader_closed) = downloaded;

        if (downloaded.is_err() || unpacked.is_err()) && cancel.is_triggered() {
            return Err(Error::Cancelled {
                operation: format!("export from {}:{}", handle.name, source),
            });
        }
        match (downloaded, unpacked) {
            // The engine only failed because unpacking gave up on the stream
            (Err(_), Err(e)) if reader_closed => Err(Error::filesystem("unpack", staging, e)),
            (Err(e), _) => {
                warn!("Download from {}:{} failed: {}", handle.name, source, e);
                Err(Error::Transfer {
                    operation: "download".to_string(),
                    container: handle.name.clone(),
                    path: source.to_string(),
                    message: e.to_string(),
                })
            }
            (Ok(()), unpacked) => unpacked.map_err(|e| Error::filesystem("unpack", staging, e)),
        }
    }

    /// Lift the directory the engine nested the archive under, if any.
    ///
    /// Candidates are the base name of the exported path, then the
    /// configured hidden directory. Only the first one present is lifted.
    fn lift_nested_root(&self, staging: &Path, source: &str) -> Result<()> {
        let mut candidates: Vec<OsString> = Vec::new();
        if let Some(base) = Path::new(source).file_name() {
            candidates.push(base.to_os_string());
        }
        if !self.settings.nested_dir.is_empty() {
            candidates.push(OsString::from(&self.settings.nested_dir));
        }

        let Some(nested) = candidates
            .iter()
            .map(|name| staging.join(name))
            .find(|path| fs::symlink_metadata(path).is_ok_and(|m| m.is_dir()))
        else {
            return Ok(());
        };

        // Move the root aside first so a child sharing its name cannot
        // collide with it during the merge
        let holder = tempfile::Builder::new()
            .prefix(".lift")
            .tempdir_in(staging)
            .map_err(|e| Error::filesystem("create staging directory", staging, e))?;
        let moved = holder.path().join("root");
        fs::rename(&nested, &moved).map_err(|e| Error::filesystem("rename", &nested, e))?;
        flatten_merge(&moved, staging)?;
        holder
            .close()
            .map_err(|e| Error::filesystem("remove", staging, e))
    }

    fn staging_dir(&self, name: &str) -> Result<tempfile::TempDir> {
        let root = self
            .settings
            .staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        tempfile::Builder::new()
            .prefix(&format!("{}-", name))
            .tempdir_in(&root)
            .map_err(|e| Error::filesystem("create staging directory", &root, e))
    }
}

/// Render an in-container path for the engine
fn container_path(path: &Path) -> Result<String> {
    let rendered = path.to_str().ok_or_else(|| Error::InvalidRequest {
        message: format!("path {} inside the data container is not valid UTF-8", path.display()),
    })?;
    if rendered.is_empty() {
        return Err(Error::InvalidRequest {
            message: "a path inside the data container is required".to_string(),
        });
    }
    Ok(rendered.to_string())
}
