//! # In-Memory Engine
//!
//! [`MemoryEngine`] implements [`Engine`] over a set of [`ContainerFs`]
//! values. It is used to exercise the data-container pipelines without a
//! container daemon, and can inject faults at every engine boundary:
//! failing lookups, failing or silent creation, transfers that break after
//! some bytes, and commands that exit non-zero.
//!
//! Every call is counted in a [`CallLog`] so tests can assert how often the
//! core talked to the engine.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::{ContainerHandle, ContainerSelector, Engine};
use crate::error::{Error, Result};
use crate::filesystem::ContainerFs;
use crate::operations::Operations;
use crate::pipe::Cancellation;

/// Faults the engine injects
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Lookups fail instead of answering
    pub fail_exists: bool,
    /// Creation fails
    pub fail_create: bool,
    /// Creation reports success but registers nothing
    pub silent_create: bool,
    /// Uploads fail after consuming this many bytes
    pub fail_upload_after: Option<usize>,
    /// Downloads fail after producing this many bytes
    pub fail_download_after: Option<usize>,
    /// Downloads stream records that are not a valid tar archive
    pub corrupt_download: bool,
    /// Uploads fire the cancellation token after completing successfully
    pub cancel_after_upload: bool,
    /// Exit status of every run
    pub run_exit_code: i64,
}

/// Calls the engine received
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub exists: usize,
    pub create: usize,
    pub upload: usize,
    pub download: usize,
    /// Container name and operations of every run, in order
    pub runs: Vec<(String, Operations)>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, (String, ContainerFs)>,
    next_id: u64,
    faults: Faults,
    calls: CallLog,
}

/// [`Engine`] whose containers live in memory
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that injects `faults`
    pub fn with_faults(faults: Faults) -> Self {
        let engine = Self::new();
        engine.lock().faults = faults;
        engine
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the injected faults
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Register an empty container named `name`
    pub fn add_container(&self, name: &str) -> ContainerHandle {
        let mut state = self.lock();
        state.insert(name)
    }

    /// Snapshot of a container's filesystem
    pub fn container_fs(&self, name: &str) -> Option<ContainerFs> {
        self.lock().containers.get(name).map(|(_, fs)| fs.clone())
    }

    /// Mutate a container's filesystem in place
    pub fn with_container_fs<F, T>(&self, name: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut ContainerFs) -> T,
    {
        self.lock().containers.get_mut(name).map(|(_, fs)| f(fs))
    }

    /// Remove a container, as if deleted behind the core's back
    pub fn remove_container(&self, name: &str) -> bool {
        self.lock().containers.remove(name).is_some()
    }

    /// Snapshot of the calls received so far
    pub fn calls(&self) -> CallLog {
        self.lock().calls.clone()
    }

    fn lookup(&self, handle: &ContainerHandle) -> Result<ContainerFs> {
        self.lock()
            .containers
            .get(&handle.name)
            .filter(|(id, _)| id == &handle.id)
            .map(|(_, fs)| fs.clone())
            .ok_or_else(|| Error::Engine {
                message: format!("No such container: {}", handle.id),
            })
    }
}

impl State {
    fn insert(&mut self, name: &str) -> ContainerHandle {
        self.next_id += 1;
        let id = format!("{:012x}", self.next_id);
        self.containers
            .insert(name.to_string(), (id.clone(), ContainerFs::new()));
        ContainerHandle {
            id,
            name: name.to_string(),
        }
    }
}

/// Reader that fails once `limit` bytes have passed through
struct FailAfter<R> {
    inner: R,
    remaining: usize,
}

impl<R: Read> Read for FailAfter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by engine",
            ));
        }
        let limit = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n;
        Ok(n)
    }
}

impl Engine for MemoryEngine {
    fn container_exists(&self, selector: &ContainerSelector) -> Result<Option<ContainerHandle>> {
        let mut state = self.lock();
        state.calls.exists += 1;
        if state.faults.fail_exists {
            return Err(Error::Engine {
                message: "Cannot connect to the engine".to_string(),
            });
        }
        Ok(state
            .containers
            .get(&selector.name)
            .map(|(id, _)| ContainerHandle {
                id: id.clone(),
                name: selector.name.clone(),
            }))
    }

    fn create_container(&self, definition: &Operations) -> Result<ContainerHandle> {
        let mut state = self.lock();
        state.calls.create += 1;
        let name = definition
            .data_container_name
            .clone()
            .ok_or_else(|| Error::InvalidRequest {
                message: "data definition has no container name".to_string(),
            })?;

        if state.faults.fail_create {
            return Err(Error::Engine {
                message: format!("Unable to find image '{}'", definition.image.clone().unwrap_or_default()),
            });
        }
        if state.containers.contains_key(&name) {
            return Err(Error::Engine {
                message: format!("Conflict. The container name \"/{}\" is already in use", name),
            });
        }
        if state.faults.silent_create {
            return Ok(ContainerHandle {
                id: "0".repeat(12),
                name,
            });
        }
        Ok(state.insert(&name))
    }

    fn upload_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        archive: &mut dyn Read,
        no_overwrite_dir_non_dir: bool,
        cancel: &Cancellation,
    ) -> Result<()> {
        let (fail_after, cancel_after) = {
            let mut state = self.lock();
            state.calls.upload += 1;
            (state.faults.fail_upload_after, state.faults.cancel_after_upload)
        };
        cancel.check()?;

        // Extract into a copy without holding the lock while streaming
        let mut fs = self.lookup(container)?;
        match fail_after {
            Some(limit) => {
                let reader = FailAfter {
                    inner: archive,
                    remaining: limit,
                };
                fs.apply_archive(Path::new(path), reader, no_overwrite_dir_non_dir)?;
            }
            None => {
                fs.apply_archive(Path::new(path), &mut *archive, no_overwrite_dir_non_dir)?;
                if cancel_after {
                    // Wait for the producer to finish before firing
                    io::copy(archive, &mut io::sink())?;
                }
            }
        }

        let mut state = self.lock();
        match state.containers.get_mut(&container.name) {
            Some((_, current)) => {
                *current = fs;
                if cancel_after {
                    cancel.cancel();
                }
                Ok(())
            }
            None => Err(Error::Engine {
                message: format!("No such container: {}", container.id),
            }),
        }
    }

    fn download_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        out: &mut dyn Write,
        cancel: &Cancellation,
    ) -> Result<()> {
        let faults = {
            let mut state = self.lock();
            state.calls.download += 1;
            state.faults.clone()
        };
        cancel.check()?;

        let fs = self.lookup(container)?;
        let mut archive = Vec::new();
        fs.write_archive(Path::new(path), &mut archive)?;
        if faults.corrupt_download {
            // Every header fails its checksum
            archive = vec![0x41; 64 * 512];
        }

        match faults.fail_download_after {
            Some(limit) => {
                out.write_all(&archive[..limit.min(archive.len())])?;
                Err(Error::Engine {
                    message: "unexpected EOF from engine while streaming archive".to_string(),
                })
            }
            None => {
                // Stream in record-sized pieces like a real engine would
                for chunk in archive.chunks(512) {
                    out.write_all(chunk)?;
                }
                Ok(())
            }
        }
    }

    fn run_in_container(&self, container: &ContainerHandle, run: &Operations) -> Result<i64> {
        let mut state = self.lock();
        state.calls.runs.push((container.name.clone(), run.clone()));
        let code = state.faults.run_exit_code;

        let Some((_, fs)) = state.containers.get_mut(&container.name) else {
            return Err(Error::Engine {
                message: format!("No such container: {}", container.id),
            });
        };

        if code == 0 {
            if let [cmd, flag, owner, target] = run.args.as_slice() {
                if cmd == "chown" && flag == "--recursive" && fs.chown_recursive(target, owner).is_err() {
                    return Ok(1);
                }
            }
        }
        Ok(code)
    }
}
