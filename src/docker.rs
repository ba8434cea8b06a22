//! Container engine backed by the `docker` command-line client
//!
//! This uses the system engine binary (`docker`, or a compatible CLI such as
//! `podman`), which automatically picks up:
//! - the `DOCKER_HOST` / context selection of the user
//! - TLS material and credential helpers
//! - rootless or remote daemons
//!
//! Archives are streamed through the child's stdin/stdout, never buffered.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::engine::{ContainerHandle, ContainerSelector, Engine};
use crate::error::{Error, Result};
use crate::operations::Operations;
use crate::pipe::Cancellation;

/// How often a running transfer checks whether it was cancelled
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// [`Engine`] implementation that shells out to a Docker-compatible CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    default_image: String,
}

impl DockerCli {
    /// Drive `binary`, running auxiliary commands in `default_image` unless a
    /// request names another image
    pub fn new(binary: impl Into<String>, default_image: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            default_image: default_image.into(),
        }
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run a short command to completion and return its trimmed stdout
    fn run_captured(&self, args: Vec<String>) -> Result<String> {
        debug!("Running {}", self.describe(&args));
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| Error::EngineCommand {
                command: self.describe(&args),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::EngineCommand {
                command: self.describe(&args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn spawn(&self, args: &[String], stdin: Stdio, stdout: Stdio) -> Result<Child> {
        debug!("Spawning {}", self.describe(args));
        Command::new(&self.binary)
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::EngineCommand {
                command: self.describe(args),
                stderr: e.to_string(),
            })
    }

    /// Finish a streaming child: kill it if the copy failed, then reap it
    fn finish(
        &self,
        args: &[String],
        mut child: Child,
        stderr: StderrDrain,
        copied: io::Result<u64>,
    ) -> Result<()> {
        let copied = match copied {
            Ok(n) => n,
            Err(e) => {
                // A half-fed `cp` must not be allowed to apply what it has
                let _ = child.kill();
                let _ = child.wait();
                let _ = stderr.join();
                return Err(Error::Engine {
                    message: format!("streaming through `{}` failed: {}", self.describe(args), e),
                });
            }
        };

        let status = child.wait().map_err(|e| Error::EngineCommand {
            command: self.describe(args),
            stderr: e.to_string(),
        })?;
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            return Err(Error::EngineCommand {
                command: self.describe(args),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        debug!("Finished {} ({} bytes)", self.describe(args), copied);
        Ok(())
    }
}

/// Background reader of a streaming child's stderr
type StderrDrain = thread::JoinHandle<Vec<u8>>;

/// Read the child's stderr on its own thread.
///
/// The child blocks once its stderr pipe is full, which would stall the
/// archive stream on the other end.
fn drain_stderr(child: &mut Child) -> StderrDrain {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut collected = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut collected);
        }
        collected
    })
}

/// Run `copy` while a watcher kills `child` if `cancel` fires.
///
/// The child is handed back once the copy returns.
fn supervise<F>(child: Child, cancel: &Cancellation, copy: F) -> (io::Result<u64>, Child)
where
    F: FnOnce() -> io::Result<u64>,
{
    let child = Mutex::new(child);
    let done = AtomicBool::new(false);

    let copied = thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                if cancel.is_triggered() {
                    let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
                    let _ = child.kill();
                    break;
                }
                thread::sleep(WATCH_INTERVAL);
            }
        });

        let copied = copy();
        done.store(true, Ordering::SeqCst);
        copied
    });

    (copied, child.into_inner().unwrap_or_else(PoisonError::into_inner))
}

impl Engine for DockerCli {
    fn container_exists(&self, selector: &ContainerSelector) -> Result<Option<ContainerHandle>> {
        // The name filter is a regex; anchor it and escape the dots in names
        let filter = format!("name=^/{}$", regex::escape(&selector.name));
        let stdout = self.run_captured(vec![
            "ps".to_string(),
            "--all".to_string(),
            "--no-trunc".to_string(),
            "--filter".to_string(),
            filter,
            "--format".to_string(),
            "{{.ID}}".to_string(),
        ])?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|id| ContainerHandle {
                id: id.to_string(),
                name: selector.name.clone(),
            }))
    }

    fn create_container(&self, definition: &Operations) -> Result<ContainerHandle> {
        let name = definition
            .data_container_name
            .clone()
            .ok_or_else(|| Error::InvalidRequest {
                message: "data definition has no container name".to_string(),
            })?;

        let mut args = vec!["create".to_string(), "--name".to_string(), name.clone()];
        for (key, value) in &definition.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(user) = &definition.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        for env in &definition.env {
            args.push("--env".to_string());
            args.push(env.clone());
        }
        args.push(
            definition
                .image
                .clone()
                .unwrap_or_else(|| self.default_image.clone()),
        );
        args.extend(definition.args.iter().cloned());

        let id = self.run_captured(args)?;
        Ok(ContainerHandle { id, name })
    }

    fn upload_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        archive: &mut dyn Read,
        no_overwrite_dir_non_dir: bool,
        cancel: &Cancellation,
    ) -> Result<()> {
        // `docker cp` never replaces a directory with a file or the reverse,
        // so the constraint holds without an extra flag
        debug!(
            "Uploading to {}:{} (no_overwrite_dir_non_dir={})",
            container.name, path, no_overwrite_dir_non_dir
        );
        let args = vec![
            "cp".to_string(),
            "-".to_string(),
            format!("{}:{}", container.id, path),
        ];
        let mut child = self.spawn(&args, Stdio::piped(), Stdio::null())?;
        let stderr = drain_stderr(&mut child);
        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Engine {
                message: "engine stdin was not captured".to_string(),
            });
        };

        let (copied, child) = supervise(child, cancel, || io::copy(archive, &mut stdin));
        match copied {
            Ok(n) => {
                drop(stdin);
                self.finish(&args, child, stderr, Ok(n))
            }
            Err(e) => {
                let result = self.finish(&args, child, stderr, Err(e));
                drop(stdin);
                result
            }
        }
    }

    fn download_archive(
        &self,
        container: &ContainerHandle,
        path: &str,
        out: &mut dyn Write,
        cancel: &Cancellation,
    ) -> Result<()> {
        let args = vec![
            "cp".to_string(),
            format!("{}:{}", container.id, path),
            "-".to_string(),
        ];
        let mut child = self.spawn(&args, Stdio::null(), Stdio::piped())?;
        let stderr = drain_stderr(&mut child);
        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Engine {
                message: "engine stdout was not captured".to_string(),
            });
        };

        let (copied, child) = supervise(child, cancel, || io::copy(&mut stdout, out));
        self.finish(&args, child, stderr, copied)
    }

    fn run_in_container(&self, container: &ContainerHandle, run: &Operations) -> Result<i64> {
        if run.args.is_empty() {
            return Err(Error::InvalidRequest {
                message: "no command given to run in the data container".to_string(),
            });
        }

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--volumes-from".to_string(),
            container.id.clone(),
        ];
        if let Some(user) = &run.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        for env in &run.env {
            args.push("--env".to_string());
            args.push(env.clone());
        }
        if run.is_interactive() {
            args.push("--interactive".to_string());
            args.push("--tty".to_string());
        }
        args.push(run.image.clone().unwrap_or_else(|| self.default_image.clone()));
        args.extend(run.args.iter().cloned());

        debug!("Running {}", self.describe(&args));
        let mut command = Command::new(&self.binary);
        command.args(&args);

        // Output goes straight to the user's terminal
        if !run.is_interactive() {
            command.stdin(Stdio::null());
        }
        let status = command
            .status()
            .map_err(|e| Error::EngineCommand {
                command: self.describe(&args),
                stderr: e.to_string(),
            })?;
        if !status.success() {
            warn!("`{}` in {} exited with {}", run.args.join(" "), container.name, status);
        }

        status.code().map(i64::from).ok_or_else(|| Error::Engine {
            message: format!("`{}` was terminated by a signal", self.describe(&args)),
        })
    }
}
