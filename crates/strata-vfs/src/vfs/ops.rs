//! VFS access trait.
//!
//! Collaborators (configuration loading, localization, protocol discovery)
//! take `&impl VfsApi` instead of a concrete [`Vfs`], so they can be tested
//! against a stub tree.

use std::path::Path;

use super::content::Content;
use super::node::Node;
use super::tree::Vfs;
use super::version::ResourceVersion;
use super::VfsResult;

/// Read and registration surface of the VFS.
pub trait VfsApi {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Node at a `/`-delimited key.
    fn get_node(&self, key: &str) -> Option<&Node>;

    /// Content of the node at `key`, at `version` or the newest.
    fn get_content(&self, key: &str, version: Option<ResourceVersion>) -> VfsResult<Option<&Content>>;

    fn has_node(&self, key: &str) -> bool {
        self.get_node(key).is_some()
    }

    /// Files under the directory at `key`; empty if there is no such directory.
    fn get_all_files(&self, key: &str, recursive: bool, filename_filter: Option<&str>) -> Vec<&Node>;

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a directory or package.
    fn register_source(&mut self, path: &Path) -> VfsResult<()>;
}

impl VfsApi for Vfs {
    fn get_node(&self, key: &str) -> Option<&Node> {
        Vfs::get_node(self, key)
    }

    fn get_content(&self, key: &str, version: Option<ResourceVersion>) -> VfsResult<Option<&Content>> {
        Vfs::get_content(self, key, version)
    }

    fn has_node(&self, key: &str) -> bool {
        Vfs::has_node(self, key)
    }

    fn get_all_files(&self, key: &str, recursive: bool, filename_filter: Option<&str>) -> Vec<&Node> {
        Vfs::get_all_files(self, key, recursive, filename_filter)
    }

    fn register_source(&mut self, path: &Path) -> VfsResult<()> {
        Vfs::register_source(self, path)
    }
}
