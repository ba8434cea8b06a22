//! # Directory Flatten/Merge
//!
//! [`flatten_merge`] moves every immediate child of one directory into
//! another and then removes the emptied source. Children are **copied**
//! (read then write) rather than renamed: staging and destination
//! directories may sit on different devices or mount namespaces, where
//! `rename(2)` fails with `EXDEV`.
//!
//! Each child is first copied into a private holder directory inside the
//! destination. Only once that copy is complete is an existing entry of the
//! same name removed and the copy renamed over it, so the moved child wins
//! at the top level and a failed copy leaves the destination as it was.
//! The rename never crosses a device.

use std::fs;
use std::path::Path;

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Move all immediate children of `src` into `dst`, then remove `src`
pub fn flatten_merge(src: &Path, dst: &Path) -> Result<()> {
    info!("Moving all entries out of {} into {}", src.display(), dst.display());

    if dst.starts_with(src) {
        return Err(Error::Path {
            message: format!(
                "cannot merge {} into itself or its own subdirectory {}",
                src.display(),
                dst.display()
            ),
        });
    }
    if !dst.is_dir() {
        return Err(Error::Filesystem {
            operation: "merge".to_string(),
            path: dst.display().to_string(),
            message: "destination is not a directory".to_string(),
        });
    }

    let children = fs::read_dir(src)
        .map_err(|e| Error::filesystem("list", src, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::filesystem("list", src, e))?;

    if children.is_empty() {
        debug!("No entries to move out of {}", src.display());
    }

    let holder = tempfile::Builder::new()
        .prefix(".merge")
        .tempdir_in(dst)
        .map_err(|e| Error::filesystem("create holder directory", dst, e))?;
    for child in children {
        let name = child.file_name();
        let copied = holder.path().join(&name);
        copy_entry(&child.path(), &copied)?;

        let target = dst.join(&name);
        remove_entry(&target)?;
        fs::rename(&copied, &target).map_err(|e| Error::filesystem("rename", &copied, e))?;
        // Moving a directory needs write access to it, so its own mode comes last
        if fs::symlink_metadata(child.path()).is_ok_and(|m| m.is_dir()) {
            copy_permissions(&child.path(), &target)?;
        }
    }
    holder
        .close()
        .map_err(|e| Error::filesystem("remove", dst, e))?;

    info!("Removing directory {}", src.display());
    fs::remove_dir_all(src).map_err(|e| Error::filesystem("remove", src, e))
}

/// Remove whatever sits at `path`, if anything
fn remove_entry(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::filesystem("inspect", path, e)),
    };

    debug!("Replacing existing {}", path.display());
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(|e| Error::filesystem("remove", path, e))
    } else {
        fs::remove_file(path).map_err(|e| Error::filesystem("remove", path, e))
    }
}

/// Copy a file, symlink or whole directory tree from `from` to `to`.
///
/// The mode of `to` itself is left to the caller when `from` is a directory.
fn copy_entry(from: &Path, to: &Path) -> Result<()> {
    // Directory permissions are applied last so read-only trees can be filled
    let mut directories = Vec::new();
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| Error::Filesystem {
            operation: "walk".to_string(),
            path: from.display().to_string(),
            message: e.to_string(),
        })?;
        let relative = entry.path().strip_prefix(from).map_err(|e| Error::Path {
            message: e.to_string(),
        })?;
        let target = if relative.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::filesystem("create directory", &target, e))?;
            directories.push((entry.path().to_path_buf(), target));
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| Error::filesystem("copy", entry.path(), e))?;
        }
    }

    for (source, target) in directories.iter().rev().filter(|(_, target)| target != to) {
        copy_permissions(source, target)?;
    }
    Ok(())
}

fn copy_permissions(from: &Path, to: &Path) -> Result<()> {
    let permissions = fs::metadata(from)
        .map_err(|e| Error::filesystem("inspect", from, e))?
        .permissions();
    fs::set_permissions(to, permissions).map_err(|e| Error::filesystem("set permissions", to, e))
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let link = fs::read_link(from).map_err(|e| Error::filesystem("read link", from, e))?;
    std::os::unix::fs::symlink(&link, to).map_err(|e| Error::filesystem("create link", to, e))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    // Without portable symlinks, copy what the link points at
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| Error::filesystem("copy", from, e))
}
