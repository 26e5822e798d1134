//! The VFS root coordinator.
//!
//! [`Vfs`] owns the root [`Node`] and turns physical sources into subtrees:
//!
//! - a directory with a `.vfs` manifest is read from the manifest
//! - any other directory is walked
//! - a regular file is registered as a tar [`Package`]
//!
//! Each source is built into a detached subtree first and then merged into
//! the root, so a source that fails to parse leaves the tree as it was.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::content::Content;
use super::error::{VfsError, VfsResult};
use super::node::Node;
use super::package::{DEFAULT_MAX_ARCHIVE_MEMBERS, MANIFEST_NAME, Package};
use super::version::ResourceVersion;
use crate::config::{VfsConfig, expand_path};

/// The virtual file system.
#[derive(Debug)]
pub struct Vfs {
    root: Node,
    packages: Vec<PathBuf>,
    scratch_dir: Option<PathBuf>,
    max_archive_members: usize,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            packages: Vec::new(),
            scratch_dir: None,
            max_archive_members: DEFAULT_MAX_ARCHIVE_MEMBERS,
        }
    }

    /// Build a VFS and register every configured source, in order.
    pub fn from_config(config: &VfsConfig) -> VfsResult<Self> {
        let mut vfs = Self {
            scratch_dir: config.scratch_dir.as_deref().map(expand_path),
            max_archive_members: config.max_archive_members,
            ..Self::new()
        };
        for source in &config.sources {
            vfs.register_source(source)?;
        }
        Ok(vfs)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Archives registered so far, in registration order.
    pub fn packages(&self) -> &[PathBuf] {
        &self.packages
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a directory or package as a data source.
    ///
    /// Fails with `InvalidInput` if `path` is neither.
    pub fn register_source(&mut self, path: impl AsRef<Path>) -> VfsResult<()> {
        let requested = expand_path(path.as_ref());
        let path = dunce::canonicalize(&requested).map_err(|e| {
            error!(path = %requested.display(), "cannot register source: {e}");
            VfsError::invalid_input(format!(
                "cannot register {} as a VFS source: {e}",
                requested.display()
            ))
        })?;

        if path.is_dir() {
            self.register_directory(&path)
        } else if path.is_file() {
            self.register_package(&path)
        } else {
            error!(path = %path.display(), "source is neither a directory nor a file");
            Err(VfsError::invalid_input(format!(
                "{} is neither a directory nor a package file",
                path.display()
            )))
        }
    }

    fn register_directory(&mut self, path: &Path) -> VfsResult<()> {
        let manifest = path.join(MANIFEST_NAME);
        let subtree = if manifest.is_file() {
            debug!(path = %path.display(), "registering directory from manifest");
            let data: Value = serde_json::from_slice(&fs::read(&manifest)?)?;
            let mut subtree = Node::from_manifest(&data)?;
            if !subtree.is_dir() {
                return Err(VfsError::invalid_input(format!(
                    "manifest {} must describe a directory",
                    manifest.display()
                )));
            }
            subtree.resolve_local_paths(path);
            subtree
        } else {
            debug!(path = %path.display(), "registering directory contents");
            let mut subtree = Node::root();
            subtree.populate_from_directory(path)?;
            subtree
        };

        self.root.merge_with(subtree)?;
        info!(path = %path.display(), "directory registered");
        Ok(())
    }

    fn register_package(&mut self, path: &Path) -> VfsResult<()> {
        debug!(path = %path.display(), "registering package");
        let package = Package::with_options(
            path,
            self.scratch_dir.as_deref(),
            self.max_archive_members,
        )?;

        let loaded = package.load(&mut self.root);
        if let Err(e) = package.dispose() {
            warn!(path = %path.display(), "failed to remove package scratch directory: {e}");
        }
        loaded?;

        self.packages.push(path.to_path_buf());
        Ok(())
    }

    // ========================================================================
    // Tree access
    // ========================================================================

    /// Node at a `/`-delimited key. Any missing segment is a miss.
    pub fn get_node(&self, key: &str) -> Option<&Node> {
        let node = self.root.get_node(key);
        if node.is_none() {
            debug!(key, "no such node");
        }
        node
    }

    pub fn has_node(&self, key: &str) -> bool {
        self.root.has_node(key)
    }

    /// Content of the node at `key`, at `version` or the newest.
    ///
    /// A missing node, a directory, or a missing version is `Ok(None)`.
    pub fn get_content(
        &self,
        key: &str,
        version: Option<ResourceVersion>,
    ) -> VfsResult<Option<&Content>> {
        let Some(node) = self.get_node(key) else {
            return Ok(None);
        };
        let Some(resource) = node.get_resource(version) else {
            debug!(key, ?version, "node has no matching resource");
            return Ok(None);
        };
        resource.content()
    }

    /// Files under the directory at `key`.
    ///
    /// Empty if `key` is missing or is not a directory.
    pub fn get_all_files(
        &self,
        key: &str,
        recursive: bool,
        filename_filter: Option<&str>,
    ) -> Vec<&Node> {
        match self.get_node(key) {
            Some(node) if node.is_dir() => node.get_all_files(recursive, filename_filter),
            Some(_) => {
                debug!(key, "not a directory, no files to list");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Add `node` under the directory at `parent` (`""` for the root),
    /// merging into an existing node of the same name.
    ///
    /// Returns `Ok(false)` if `parent` does not exist.
    pub fn add_node(&mut self, node: Node, parent: &str) -> VfsResult<bool> {
        let Some(parent_node) = self.root.get_node_mut(parent) else {
            error!(parent, node = %node.name(), "no such parent node, cannot add");
            return Ok(false);
        };
        debug!(parent, node = %node.name(), "adding node");
        parent_node.add_child(node)?;
        Ok(true)
    }

    /// Remove and return the node at `key`.
    pub fn remove_node(&mut self, key: &str) -> Option<Node> {
        debug!(key, "removing node");
        self.root.remove_child(key)
    }
}
