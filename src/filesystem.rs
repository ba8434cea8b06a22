//! In-memory container filesystem that speaks tar

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// What a node in the filesystem is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

/// A file, directory or symlink with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// Permission bits
    pub mode: u32,
    /// Owning user name
    pub owner: String,
}

impl Node {
    fn dir(owner: &str) -> Self {
        Self {
            kind: NodeKind::Dir,
            mode: 0o755,
            owner: owner.to_string(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }
}

/// Identity that owns whatever an archive extraction creates
const EXTRACT_OWNER: &str = "root";

/// Filesystem of a single container, keyed by absolute path
#[derive(Debug, Clone)]
pub struct ContainerFs {
    nodes: BTreeMap<PathBuf, Node>,
}

impl Default for ContainerFs {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::dir(EXTRACT_OWNER));
        Self { nodes }
    }
}

/// Turn `path` into an absolute path with no `.` or `..` components
fn normalize(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                return Err(Error::Path {
                    message: format!("'..' is not allowed in container path {}", path.display()),
                })
            }
        }
    }
    Ok(out)
}

impl ContainerFs {
    /// Create a filesystem holding only `/`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory and all missing ancestors
    pub fn add_dir_all<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = normalize(path.as_ref())?;
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            match self.nodes.get(ancestor) {
                Some(node) if node.is_dir() => {}
                Some(_) => {
                    return Err(Error::Path {
                        message: format!("{} is not a directory", ancestor.display()),
                    })
                }
                None => {
                    self.nodes
                        .insert(ancestor.to_path_buf(), Node::dir(EXTRACT_OWNER));
                }
            }
        }
        Ok(())
    }

    /// Add or replace a regular file, creating parent directories
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P, content: &[u8]) -> Result<()> {
        let path = normalize(path.as_ref())?;
        if let Some(parent) = path.parent() {
            self.add_dir_all(parent)?;
        }
        if self.nodes.get(&path).is_some_and(Node::is_dir) {
            return Err(Error::Path {
                message: format!("{} is a directory", path.display()),
            });
        }
        self.nodes.insert(
            path,
            Node {
                kind: NodeKind::File(content.to_vec()),
                mode: 0o644,
                owner: EXTRACT_OWNER.to_string(),
            },
        );
        Ok(())
    }

    /// Get a node by absolute path
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<&Node> {
        normalize(path.as_ref()).ok().and_then(|p| self.nodes.get(&p))
    }

    /// Check if a path exists
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.get(path).is_some()
    }

    /// Content of a regular file
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Option<&[u8]> {
        match &self.get(path)?.kind {
            NodeKind::File(content) => Some(content),
            _ => None,
        }
    }

    /// Owner of a path
    pub fn owner<P: AsRef<Path>>(&self, path: P) -> Option<&str> {
        self.get(path).map(|node| node.owner.as_str())
    }

    /// Paths at or below `path`, in parent-before-child order
    fn subtree<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a Node)> + 'a {
        self.nodes
            .range(path.to_path_buf()..)
            .take_while(move |(p, _)| p.starts_with(path))
    }

    /// Hand `path` and everything below it to `owner`
    pub fn chown_recursive<P: AsRef<Path>>(&mut self, path: P, owner: &str) -> Result<usize> {
        let path = normalize(path.as_ref())?;
        if !self.nodes.contains_key(&path) {
            return Err(Error::Path {
                message: format!("chown: cannot access '{}': No such file or directory", path.display()),
            });
        }
        let targets: Vec<PathBuf> = self.subtree(&path).map(|(p, _)| p.clone()).collect();
        for target in &targets {
            if let Some(node) = self.nodes.get_mut(target) {
                node.owner = owner.to_string();
            }
        }
        Ok(targets.len())
    }

    /// Extract a tar stream below `dest`.
    ///
    /// The whole archive is validated before anything is written. With
    /// `no_overwrite_dir_non_dir`, replacing a directory with a non-directory
    /// (or the reverse) fails the call and leaves the filesystem untouched.
    /// Returns the number of entries applied.
    pub fn apply_archive<R: Read>(
        &mut self,
        dest: &Path,
        reader: R,
        no_overwrite_dir_non_dir: bool,
    ) -> Result<usize> {
        let dest = normalize(dest)?;
        let mut staged = self.clone();
        staged.add_dir_all(&dest)?;

        let mut archive = tar::Archive::new(reader);
        let mut applied = 0;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let relative = entry.path()?.into_owned();
            let target = normalize(&dest.join(&relative))?;
            if target == dest {
                continue;
            }

            let mode = entry.header().mode().unwrap_or(0o644);
            let kind = match entry.header().entry_type() {
                tar::EntryType::Directory => NodeKind::Dir,
                tar::EntryType::Symlink => NodeKind::Symlink(
                    entry
                        .link_name()?
                        .map(|link| link.into_owned())
                        .unwrap_or_default(),
                ),
                tar::EntryType::Regular | tar::EntryType::Continuous => {
                    let mut content = Vec::new();
                    entry.read_to_end(&mut content)?;
                    NodeKind::File(content)
                }
                other => {
                    log::debug!("Skipping unsupported entry {:?} at {}", other, target.display());
                    continue;
                }
            };

            let incoming_dir = matches!(kind, NodeKind::Dir);
            if let Some(existing) = staged.nodes.get(&target) {
                if no_overwrite_dir_non_dir && existing.is_dir() != incoming_dir {
                    let (from, to) = if existing.is_dir() {
                        ("directory", "non-directory")
                    } else {
                        ("non-directory", "directory")
                    };
                    return Err(Error::Engine {
                        message: format!(
                            "cannot overwrite {} {} with {}",
                            from,
                            target.display(),
                            to
                        ),
                    });
                }
                if existing.is_dir() && incoming_dir {
                    continue;
                }
            }

            if let Some(parent) = target.parent() {
                staged.add_dir_all(parent)?;
            }
            // Replacing a directory drops everything below it
            let stale: Vec<PathBuf> = staged
                .subtree(&target)
                .map(|(p, _)| p.clone())
                .filter(|p| p != &target)
                .collect();
            for path in stale {
                staged.nodes.remove(&path);
            }
            staged.nodes.insert(
                target,
                Node {
                    kind,
                    mode: mode & 0o7777,
                    owner: EXTRACT_OWNER.to_string(),
                },
            );
            applied += 1;
        }

        *self = staged;
        Ok(applied)
    }

    /// Write `path` and everything below it as a tar stream.
    ///
    /// Entries are rooted at the base name of `path`, the layout engines use
    /// for archive downloads.
    pub fn write_archive<W: Write>(&self, path: &Path, out: W) -> Result<()> {
        let path = normalize(path)?;
        if !self.nodes.contains_key(&path) {
            return Err(Error::Path {
                message: format!("Could not find the file {} in container", path.display()),
            });
        }
        let base = path.parent().unwrap_or(Path::new("/"));

        let mut builder = tar::Builder::new(out);
        for (node_path, node) in self.subtree(&path) {
            let name = node_path.strip_prefix(base).unwrap_or(node_path);
            if name.as_os_str().is_empty() {
                continue;
            }

            let mut header = tar::Header::new_gnu();
            header.set_mode(node.mode);
            header.set_mtime(0);
            match &node.kind {
                NodeKind::Dir => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    builder.append_data(&mut header, name, std::io::empty())?;
                }
                NodeKind::File(content) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(content.len() as u64);
                    builder.append_data(&mut header, name, content.as_slice())?;
                }
                NodeKind::Symlink(target) => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    builder.append_link(&mut header, name, target)?;
                }
            }
        }
        builder.into_inner()?.flush()?;
        Ok(())
    }
}
