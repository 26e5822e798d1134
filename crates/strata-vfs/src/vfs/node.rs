//! VFS tree nodes.
//!
//! A node is either a directory (named subdirectories and files) or a file
//! (a list of [`Resource`]s sorted newest first). Parents own their children
//! outright; there are no back-references.
//!
//! ## Layering
//!
//! Adding a child whose name is already taken merges the two nodes instead of
//! replacing one with the other. For files, the resource lists are unioned
//! and a version that is already present is kept, so the first source to
//! register a version wins. Directories merge recursively.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value, json};
use tracing::{debug, error, trace, warn};

use super::descriptor::{Descriptor, LocalFile};
use super::error::{VfsError, VfsResult};
use super::resource::Resource;
use super::version::ResourceVersion;

/// Reserved name of the tree root.
pub const ROOT_NAME: &str = "ROOT";

/// Manifest type tag for directory nodes.
pub const DIRECTORY_TAG: &str = "directory";

/// Manifest type tag for file nodes.
pub const FILE_TAG: &str = "file";

/// Older manifests tag file nodes with their descriptor type.
const LEGACY_FILE_TAGS: [&str; 2] = ["localfile", "packagefile"];

/// Node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Directory {
        subdirs: BTreeMap<String, Node>,
        files: BTreeMap<String, Node>,
    },
    File {
        resources: Vec<Resource>,
    },
}

impl NodeKind {
    fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Directory { .. } => NodeType::Directory,
            NodeKind::File { .. } => NodeType::File,
        }
    }

    fn empty(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Directory => NodeKind::Directory {
                subdirs: BTreeMap::new(),
                files: BTreeMap::new(),
            },
            NodeType::File => NodeKind::File {
                resources: Vec::new(),
            },
        }
    }
}

/// One element of the VFS tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    kind: NodeKind,
}

impl Node {
    /// Create the tree root.
    pub fn root() -> Self {
        Self::directory(ROOT_NAME)
    }

    /// Create an empty directory node. An empty name makes a root.
    pub fn directory(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() { ROOT_NAME.to_string() } else { name },
            kind: NodeKind::empty(NodeType::Directory),
        }
    }

    /// Create an empty file node.
    ///
    /// Fails for an empty name, which is reserved for the root, and the root
    /// is always a directory.
    pub fn file(name: impl Into<String>) -> VfsResult<Self> {
        let name = name.into();
        if name.is_empty() || name == ROOT_NAME {
            return Err(VfsError::invalid_input(
                "the root VFS node can only be a directory node",
            ));
        }
        Ok(Self {
            name,
            kind: NodeKind::empty(NodeType::File),
        })
    }

    /// Parse a manifest into a new node.
    pub fn from_manifest(data: &Value) -> VfsResult<Self> {
        Self::parse(data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn is_dir(&self) -> bool {
        self.node_type() == NodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.node_type() == NodeType::File
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_NAME && self.is_dir()
    }

    // ========================================================================
    // Children (directory nodes)
    // ========================================================================

    /// Subdirectory nodes, by name. Empty for file nodes.
    pub fn subdirectories(&self) -> impl Iterator<Item = &Node> {
        let subdirs = match &self.kind {
            NodeKind::Directory { subdirs, .. } => Some(subdirs.values()),
            NodeKind::File { .. } => None,
        };
        subdirs.into_iter().flatten()
    }

    /// File nodes directly under this node, by name. Empty for file nodes.
    pub fn files(&self) -> impl Iterator<Item = &Node> {
        let files = match &self.kind {
            NodeKind::Directory { files, .. } => Some(files.values()),
            NodeKind::File { .. } => None,
        };
        files.into_iter().flatten()
    }

    pub fn num_children(&self) -> usize {
        match &self.kind {
            NodeKind::Directory { subdirs, files } => subdirs.len() + files.len(),
            NodeKind::File { .. } => 0,
        }
    }

    /// Whether a direct child with this name exists.
    pub fn has_child(&self, name: &str) -> bool {
        self.get_child(name).is_some()
    }

    /// Direct child by name.
    pub fn get_child(&self, name: &str) -> Option<&Node> {
        match &self.kind {
            NodeKind::Directory { subdirs, files } => subdirs.get(name).or_else(|| files.get(name)),
            NodeKind::File { .. } => None,
        }
    }

    pub fn get_child_mut(&mut self, name: &str) -> Option<&mut Node> {
        match &mut self.kind {
            NodeKind::Directory { subdirs, files } => match subdirs.get_mut(name) {
                Some(node) => Some(node),
                None => files.get_mut(name),
            },
            NodeKind::File { .. } => None,
        }
    }

    /// Add a child, merging into an existing child of the same name.
    pub fn add_child(&mut self, node: Node) -> VfsResult<()> {
        let parent = self.name.clone();
        let NodeKind::Directory { subdirs, files } = &mut self.kind else {
            error!(node = %parent, child = %node.name, "file nodes cannot have children");
            return Err(VfsError::runtime(format!(
                "cannot add child {} to file node {parent}",
                node.name
            )));
        };

        let existing = match subdirs.get_mut(&node.name) {
            Some(existing) => Some(existing),
            None => files.get_mut(&node.name),
        };
        if let Some(existing) = existing {
            debug!(node = %parent, child = %node.name, "child exists, merging");
            return existing.merge_with(node);
        }

        debug!(node = %parent, child = %node.name, kind = ?node.node_type(), "adding child");
        match node.node_type() {
            NodeType::Directory => subdirs.insert(node.name.clone(), node),
            NodeType::File => files.insert(node.name.clone(), node),
        };
        Ok(())
    }

    /// Remove a node by `/`-delimited path relative to this node.
    pub fn remove_child(&mut self, path: &str) -> Option<Node> {
        let mut segments: Vec<&str> = split_path(path).collect();
        let last = segments.pop()?;

        let mut parent = self;
        for segment in segments {
            parent = parent.get_child_mut(segment)?;
        }

        let NodeKind::Directory { subdirs, files } = &mut parent.kind else {
            return None;
        };
        let removed = subdirs.remove(last).or_else(|| files.remove(last));
        match &removed {
            Some(_) => debug!(node = %parent.name, child = last, "removed child"),
            None => debug!(node = %parent.name, child = last, "no such child, nothing to remove"),
        }
        removed
    }

    /// Look up a node by `/`-delimited path relative to this node.
    ///
    /// A leading `/` is ignored and an empty path names this node. Any
    /// missing segment, including one that passes through a file, is a miss.
    pub fn get_node(&self, path: &str) -> Option<&Node> {
        split_path(path).try_fold(self, |node, segment| node.get_child(segment))
    }

    pub fn get_node_mut(&mut self, path: &str) -> Option<&mut Node> {
        let mut node = self;
        for segment in split_path(path) {
            node = node.get_child_mut(segment)?;
        }
        Some(node)
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.get_node(path).is_some()
    }

    /// File nodes under this directory.
    ///
    /// `filename_filter` keeps only files whose name contains the given
    /// substring; it applies at every depth when `recursive` is set.
    pub fn get_all_files(&self, recursive: bool, filename_filter: Option<&str>) -> Vec<&Node> {
        let mut result: Vec<&Node> = self
            .files()
            .filter(|file| filename_filter.is_none_or(|f| file.name.contains(f)))
            .collect();

        if recursive {
            for subdir in self.subdirectories() {
                result.extend(subdir.get_all_files(true, filename_filter));
            }
        }
        result
    }

    // ========================================================================
    // Resources (file nodes)
    // ========================================================================

    /// Resources, newest first. Empty for directory nodes.
    pub fn resources(&self) -> &[Resource] {
        match &self.kind {
            NodeKind::File { resources } => resources,
            NodeKind::Directory { .. } => &[],
        }
    }

    pub fn num_resources(&self) -> usize {
        self.resources().len()
    }

    /// The newest resource.
    pub fn latest(&self) -> Option<&Resource> {
        self.resources().first()
    }

    /// The resource with exactly `version`, or the newest if `None`.
    pub fn get_resource(&self, version: Option<ResourceVersion>) -> Option<&Resource> {
        match version {
            None => self.latest(),
            Some(v) => self.resources().iter().find(|r| r.version() == v),
        }
    }

    pub fn has_resource(&self, version: ResourceVersion) -> bool {
        self.get_resource(Some(version)).is_some()
    }

    /// Add a resource to a file node.
    ///
    /// Returns `Ok(false)` if a resource with the same version is already
    /// present; the incoming one is dropped. Unless `skip_sort` is set the
    /// list is re-sorted newest first, so batch inserts can sort once at the
    /// end via [`Node::sort_resources`].
    pub fn add_resource(&mut self, resource: Resource, skip_sort: bool) -> VfsResult<bool> {
        let NodeKind::File { resources } = &mut self.kind else {
            error!(node = %self.name, "directory nodes cannot have resources");
            return Err(VfsError::runtime(format!(
                "directory node {} cannot have resources",
                self.name
            )));
        };

        trace!(node = %self.name, descriptor = %resource.descriptor().location(), "adding resource");
        if resources.iter().any(|r| r.version() == resource.version()) {
            warn!(
                node = %self.name,
                version = %resource.version(),
                "node already has a resource with this version, ignoring"
            );
            return Ok(false);
        }

        resources.push(resource);
        if !skip_sort {
            sort_newest_first(resources);
        }
        Ok(true)
    }

    /// Add `descriptor` as the next numbered version and return it.
    ///
    /// The version is one past the highest finite version on the node, or 1
    /// for the first. A `LATEST` resource still outranks it.
    pub fn add_next_version(
        &mut self,
        descriptor: impl Into<Descriptor>,
    ) -> VfsResult<ResourceVersion> {
        let mut version = self
            .resources()
            .iter()
            .map(Resource::version)
            .filter(|v| !v.is_latest())
            .max()
            .unwrap_or(ResourceVersion::Finite(0));
        version.bump();

        self.add_resource(Resource::new(version, descriptor), false)?;
        debug!(node = %self.name, %version, "added next resource version");
        Ok(version)
    }

    /// Re-sort resources newest first.
    pub fn sort_resources(&mut self) {
        if let NodeKind::File { resources } = &mut self.kind {
            sort_newest_first(resources);
        }
    }

    /// Remove the resource with exactly `version`.
    pub fn remove_resource(&mut self, version: ResourceVersion) -> Option<Resource> {
        let NodeKind::File { resources } = &mut self.kind else {
            return None;
        };
        let index = resources.iter().position(|r| r.version() == version);
        match index {
            Some(i) => {
                debug!(node = %self.name, %version, "removed resource");
                Some(resources.remove(i))
            }
            None => {
                debug!(node = %self.name, %version, "no resource with this version, nothing to remove");
                None
            }
        }
    }

    /// Drop all children and resources. Name and type are kept.
    pub fn reset(&mut self) {
        debug!(node = %self.name, "resetting node");
        self.kind = NodeKind::empty(self.node_type());
    }

    // ========================================================================
    // Merging
    // ========================================================================

    /// Check that `other` can be merged into this node without a kind
    /// mismatch anywhere in the two subtrees.
    pub fn check_merge(&self, other: &Node) -> VfsResult<()> {
        if self.node_type() != other.node_type() {
            error!(
                node = %self.name,
                other = %other.name,
                "node types differ, cannot merge"
            );
            return Err(VfsError::invalid_input(format!(
                "cannot merge {:?} node {} into {:?} node {}",
                other.node_type(),
                other.name,
                self.node_type(),
                self.name
            )));
        }

        for child in other.subdirectories().chain(other.files()) {
            if let Some(existing) = self.get_child(&child.name) {
                existing.check_merge(child)?;
            }
        }
        Ok(())
    }

    /// Merge `other` into this node.
    ///
    /// Both nodes must have the same type, at every level where names
    /// collide; this is checked before anything is changed, so on error
    /// neither tree has been modified.
    pub fn merge_with(&mut self, other: Node) -> VfsResult<()> {
        self.check_merge(&other)?;
        debug!(node = %self.name, other = %other.name, "merging");
        self.merge_checked(other);
        Ok(())
    }

    fn merge_checked(&mut self, other: Node) {
        match other.kind {
            NodeKind::File { resources: incoming } => {
                let NodeKind::File { resources } = &mut self.kind else {
                    return;
                };
                for resource in incoming {
                    if resources.iter().any(|r| r.version() == resource.version()) {
                        warn!(
                            node = %self.name,
                            version = %resource.version(),
                            "version already registered, keeping the existing resource"
                        );
                        continue;
                    }
                    resources.push(resource);
                }
                sort_newest_first(resources);
            }
            NodeKind::Directory { subdirs: incoming_dirs, files: incoming_files } => {
                let NodeKind::Directory { subdirs, files } = &mut self.kind else {
                    return;
                };
                for (name, child) in incoming_dirs.into_iter().chain(incoming_files) {
                    let existing = match subdirs.get_mut(&name) {
                        Some(existing) => Some(existing),
                        None => files.get_mut(&name),
                    };
                    match existing {
                        Some(existing) => existing.merge_checked(child),
                        None if child.is_dir() => {
                            subdirs.insert(name, child);
                        }
                        None => {
                            files.insert(name, child);
                        }
                    }
                }
            }
        }
    }

    // ========================================================================
    // Manifest (de)serialization
    // ========================================================================

    /// Serialize to the `.vfs` manifest format.
    pub fn serialize(&self) -> Value {
        match &self.kind {
            NodeKind::Directory { subdirs, files } => {
                let subdirectories: Map<String, Value> = subdirs
                    .iter()
                    .map(|(name, node)| (name.clone(), node.serialize()))
                    .collect();
                let files: Map<String, Value> = files
                    .iter()
                    .map(|(name, node)| (name.clone(), node.serialize()))
                    .collect();
                json!({
                    "name": self.name,
                    "type": DIRECTORY_TAG,
                    "subdirectories": subdirectories,
                    "files": files,
                })
            }
            NodeKind::File { resources } => json!({
                "name": self.name,
                "type": FILE_TAG,
                "resource": resources.iter().map(Resource::serialize).collect::<Vec<_>>(),
            }),
        }
    }

    /// Replace this node's name, type, and content with a manifest.
    ///
    /// This never merges: the previous content is discarded. A root keeps
    /// its reserved name and must stay a directory. On error the node is left
    /// unchanged.
    pub fn deserialize(&mut self, data: &Value) -> VfsResult<()> {
        let mut parsed = Self::parse(data)?;
        if self.is_root() {
            if !parsed.is_dir() {
                return Err(VfsError::invalid_input(
                    "the root VFS node can only be a directory node",
                ));
            }
            parsed.name = ROOT_NAME.to_string();
        }
        *self = parsed;
        Ok(())
    }

    fn parse(data: &Value) -> VfsResult<Self> {
        let Some(map) = data.as_object() else {
            return Err(VfsError::invalid_input(format!(
                "trying to deserialize a node from non-map data: {data}"
            )));
        };

        let name = match map.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(VfsError::invalid_input(format!(
                    "node name must be a string, got: {other}"
                )));
            }
            None => {
                return Err(VfsError::invalid_input(
                    "node name was not found in the serialized data",
                ));
            }
        };

        let Some(node_type) = map.get("type").and_then(Value::as_str) else {
            return Err(VfsError::invalid_input(format!(
                "node type was not found for node {name}"
            )));
        };
        trace!(node = %name, node_type, "deserializing node");

        if node_type == DIRECTORY_TAG {
            let mut node = Self::directory(name);
            for section in ["subdirectories", "files"] {
                let Some(children) = map.get(section) else {
                    debug!(node = %node.name, section, "no entries");
                    continue;
                };
                let Some(children) = children.as_object() else {
                    return Err(VfsError::invalid_input(format!(
                        "{section} of node {} must be a map",
                        node.name
                    )));
                };
                for child in children.values() {
                    node.add_child(Self::parse(child)?)?;
                }
            }
            Ok(node)
        } else if node_type == FILE_TAG || LEGACY_FILE_TAGS.contains(&node_type) {
            let mut node = Self::file(name)?;
            match map.get("resource") {
                None => debug!(node = %node.name, "no resources"),
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        node.add_resource(Resource::deserialize(entry)?, true)?;
                    }
                    node.sort_resources();
                }
                Some(other) => {
                    return Err(VfsError::invalid_input(format!(
                        "resources of node {} must be a list, got: {other}",
                        node.name
                    )));
                }
            }
            Ok(node)
        } else {
            Err(VfsError::invalid_input(format!(
                "unknown node type {node_type:?} for node {name}"
            )))
        }
    }

    // ========================================================================
    // Filesystem ingestion
    // ========================================================================

    /// Add the contents of a real directory under this node.
    ///
    /// Subdirectories become directory nodes; files become file nodes with a
    /// single `LATEST` local-file resource, so nothing registered later can
    /// outrank them.
    pub fn populate_from_directory(&mut self, path: &Path) -> VfsResult<()> {
        if !self.is_dir() {
            return Err(VfsError::runtime(format!(
                "cannot populate file node {} from a directory",
                self.name
            )));
        }

        let mut entries = fs::read_dir(path)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let full_path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %full_path.display(), "skipping entry with non UTF-8 name");
                continue;
            };

            if full_path.is_dir() {
                debug!(node = %self.name, child = %name, path = %full_path.display(), "adding subdirectory");
                let mut child = Self::directory(name);
                child.populate_from_directory(&full_path)?;
                self.add_child(child)?;
            } else {
                debug!(node = %self.name, child = %name, path = %full_path.display(), "adding file");
                let mut child = Self::file(name)?;
                child.add_resource(
                    Resource::new(ResourceVersion::LATEST, LocalFile::new(full_path)),
                    false,
                )?;
                self.add_child(child)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Descriptor rewriting
    // ========================================================================

    /// Apply `f` to every descriptor in this subtree.
    pub(crate) fn for_each_descriptor_mut(&mut self, f: &mut impl FnMut(&mut Descriptor)) {
        match &mut self.kind {
            NodeKind::File { resources } => {
                for resource in resources {
                    f(resource.descriptor_mut());
                }
            }
            NodeKind::Directory { subdirs, files } => {
                for child in subdirs.values_mut().chain(files.values_mut()) {
                    child.for_each_descriptor_mut(f);
                }
            }
        }
    }

    /// Point every package-file descriptor at `archive`, read with at most
    /// `max_members` entries scanned.
    pub(crate) fn bind_package(&mut self, archive: &Path, max_members: usize) {
        self.for_each_descriptor_mut(&mut |descriptor| {
            if let Descriptor::PackageFile(d) = descriptor {
                d.set_package_path(archive);
                d.set_max_members(max_members);
            }
        });
    }

    /// Resolve relative local-file paths against `base`.
    pub(crate) fn resolve_local_paths(&mut self, base: &Path) {
        self.for_each_descriptor_mut(&mut |descriptor| {
            if let Descriptor::LocalFile(d) = descriptor {
                if d.path().is_relative() {
                    let resolved = base.join(d.path());
                    d.set_path(resolved);
                }
            }
        });
    }
}

fn sort_newest_first(resources: &mut [Resource]) {
    resources.sort_by(|a, b| b.version().cmp(&a.version()));
}

/// Non-empty `/`-separated segments of a VFS path.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::descriptor::PackageFile;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn v(n: i64) -> ResourceVersion {
        ResourceVersion::new(n).unwrap()
    }

    fn local(version: ResourceVersion, path: &str) -> Resource {
        Resource::new(version, LocalFile::new(path))
    }

    fn file_with(name: &str, versions: &[i64]) -> Node {
        let mut node = Node::file(name).unwrap();
        for &n in versions {
            node.add_resource(local(v(n), &format!("/{name}.{n}")), false).unwrap();
        }
        node
    }

    fn versions(node: &Node) -> Vec<ResourceVersion> {
        node.resources().iter().map(Resource::version).collect()
    }

    fn sample_manifest() -> Value {
        json!({
            "name": "ROOT",
            "type": "directory",
            "subdirectories": {
                "directory1": {
                    "name": "directory1",
                    "type": "directory",
                    "subdirectories": {},
                    "files": {
                        "file1.txt": {
                            "name": "file1.txt",
                            "type": "file",
                            "resource": [
                                {
                                    "version": 2,
                                    "descriptor": { "type": "packagefile", "path": "/directory1/file1.txt", "contenttype": "text/plain" }
                                },
                                {
                                    "version": 1,
                                    "descriptor": { "type": "localfile", "path": "/srv/file1.txt" }
                                }
                            ]
                        }
                    }
                }
            },
            "files": {
                "top.json": {
                    "name": "top.json",
                    "type": "file",
                    "resource": [
                        { "version": "latest", "descriptor": { "type": "localfile", "path": "/srv/top.json" } }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_root_invariants() {
        let root = Node::root();
        assert!(root.is_root());
        assert!(root.is_dir());
        assert_eq!(root.name(), ROOT_NAME);
        assert_eq!(Node::directory("").name(), ROOT_NAME);
        assert!(Node::file("").unwrap_err().is_invalid_input());
        assert!(!Node::directory("etc").is_root());
    }

    #[test]
    fn test_batch_insert_then_sort() {
        let mut node = Node::file("data.bin").unwrap();
        for n in [3, 1, 4, 2] {
            assert!(node.add_resource(local(v(n), "/x"), true).unwrap());
        }
        node.sort_resources();

        assert_eq!(node.latest().unwrap().version(), v(4));
        assert_eq!(versions(&node), vec![v(4), v(3), v(2), v(1)]);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut node = Node::file("a.txt").unwrap();
        node.add_resource(local(v(1), "/original"), false).unwrap();
        let added = node.add_resource(local(v(1), "/duplicate"), false).unwrap();

        assert!(!added);
        assert_eq!(node.num_resources(), 1);
        let kept = node.get_resource(Some(v(1))).unwrap();
        assert_eq!(kept.descriptor().location(), "/original");
    }

    #[test]
    fn test_get_resource() {
        let node = file_with("a", &[1, 5, 3]);
        assert_eq!(node.get_resource(None).unwrap().version(), v(5));
        assert_eq!(node.get_resource(Some(v(3))).unwrap().version(), v(3));
        assert!(node.get_resource(Some(v(2))).is_none());
        assert!(node.has_resource(v(1)));
        assert!(Node::file("empty").unwrap().latest().is_none());
    }

    #[test]
    fn test_add_next_version() {
        let mut node = file_with("a", &[2, 5]);
        assert_eq!(node.add_next_version(LocalFile::new("/a.6")).unwrap(), v(6));
        assert_eq!(node.latest().unwrap().descriptor().location(), "/a.6");

        node.add_resource(local(ResourceVersion::LATEST, "/a.latest"), false).unwrap();
        assert_eq!(node.add_next_version(LocalFile::new("/a.7")).unwrap(), v(7));
        assert!(node.latest().unwrap().version().is_latest());
        assert_eq!(versions(&node)[1], v(7));

        let mut empty = Node::file("b").unwrap();
        assert_eq!(empty.add_next_version(LocalFile::new("/b")).unwrap(), v(1));
        let mut dir = Node::directory("d");
        assert!(dir.add_next_version(LocalFile::new("/d")).unwrap_err().is_runtime());
    }

    #[test]
    fn test_remove_resource() {
        let mut node = file_with("a", &[1, 2]);
        assert!(node.remove_resource(v(2)).is_some());
        assert!(node.remove_resource(v(2)).is_none());
        assert_eq!(versions(&node), vec![v(1)]);
    }

    #[test]
    fn test_wrong_kind_operations() {
        let mut dir = Node::directory("d");
        assert!(dir.add_resource(local(v(1), "/x"), false).unwrap_err().is_runtime());
        assert!(dir.resources().is_empty());
        assert!(dir.get_resource(None).is_none());

        let mut file = Node::file("f").unwrap();
        assert!(file.add_child(Node::directory("x")).unwrap_err().is_runtime());
        assert!(file.get_child("x").is_none());
        assert_eq!(file.subdirectories().count(), 0);
    }

    #[test]
    fn test_add_child_merges_on_collision() {
        let mut root = Node::root();
        let mut a = Node::directory("conf");
        a.add_child(file_with("app.conf", &[1])).unwrap();
        let mut b = Node::directory("conf");
        b.add_child(file_with("app.conf", &[2])).unwrap();
        b.add_child(file_with("db.conf", &[1])).unwrap();

        root.add_child(a).unwrap();
        root.add_child(b).unwrap();

        let conf = root.get_child("conf").unwrap();
        assert_eq!(conf.num_children(), 2);
        let app = root.get_node("conf/app.conf").unwrap();
        assert_eq!(versions(app), vec![v(2), v(1)]);
    }

    #[test]
    fn test_merge_first_registered_wins() {
        let mut first = Node::file("a").unwrap();
        first.add_resource(local(v(1), "/first"), false).unwrap();
        let mut second = Node::file("a").unwrap();
        second.add_resource(local(v(1), "/second"), false).unwrap();
        second.add_resource(local(v(7), "/second7"), false).unwrap();

        first.merge_with(second).unwrap();
        assert_eq!(versions(&first), vec![v(7), v(1)]);
        assert_eq!(
            first.get_resource(Some(v(1))).unwrap().descriptor().location(),
            "/first"
        );
    }

    #[test]
    fn test_merge_with_self_is_idempotent() {
        let mut root = Node::from_manifest(&sample_manifest()).unwrap();
        let before = root.clone();
        root.merge_with(before.clone()).unwrap();

        assert_eq!(root, before);
        let file = root.get_node("directory1/file1.txt").unwrap();
        assert_eq!(file.num_resources(), 2);
        assert_eq!(root.num_children(), 2);
    }

    #[test]
    fn test_kind_mismatch_merge() {
        let mut file = file_with("x", &[1]);
        let dir = Node::directory("x");
        let file_before = file.clone();
        assert!(file.merge_with(dir.clone()).unwrap_err().is_invalid_input());
        assert_eq!(file, file_before);

        let mut dir = dir;
        assert!(dir.merge_with(file_with("x", &[1])).unwrap_err().is_invalid_input());
        assert_eq!(dir.num_children(), 0);
    }

    #[test]
    fn test_nested_kind_mismatch_leaves_tree_untouched() {
        let mut left = Node::root();
        let mut left_sub = Node::directory("a");
        left_sub.add_child(Node::directory("clash")).unwrap();
        left.add_child(left_sub).unwrap();

        let mut right = Node::root();
        let mut right_sub = Node::directory("a");
        right_sub.add_child(file_with("zzz", &[1])).unwrap();
        right_sub.add_child(file_with("clash", &[1])).unwrap();
        right.add_child(right_sub).unwrap();
        right.add_child(Node::directory("b")).unwrap();

        let before = left.clone();
        assert!(left.merge_with(right).is_err());
        assert_eq!(left, before);
    }

    #[test]
    fn test_nested_lookup() {
        let root = Node::from_manifest(&sample_manifest()).unwrap();
        assert!(root.has_node("directory1"));
        assert!(root.has_node("/directory1/file1.txt"));
        assert!(root.has_node("directory1//file1.txt"));
        assert!(!root.has_node("missing/file1.txt"));
        assert!(!root.has_node("top.json/inner"));
        assert_eq!(root.get_node("").unwrap().name(), ROOT_NAME);
    }

    #[test]
    fn test_remove_child() {
        let mut root = Node::from_manifest(&sample_manifest()).unwrap();
        assert!(root.remove_child("directory1/file1.txt").is_some());
        assert!(root.has_node("directory1"));
        assert!(!root.has_node("directory1/file1.txt"));
        assert!(root.remove_child("nope/x").is_none());
        assert!(root.remove_child("top.json").is_some());
        assert!(root.remove_child("").is_none());
    }

    #[test]
    fn test_manifest_round_trip() {
        let manifest = sample_manifest();
        let root = Node::from_manifest(&manifest).unwrap();
        assert_eq!(root.serialize(), manifest);

        let top = root.get_node("top.json").unwrap();
        assert!(top.latest().unwrap().version().is_latest());
        let file1 = root.get_node("directory1/file1.txt").unwrap();
        assert_eq!(file1.latest().unwrap().descriptor().tag(), "packagefile");
    }

    #[test]
    fn test_deserialize_resets() {
        let mut root = Node::root();
        root.add_child(file_with("old", &[1])).unwrap();
        root.deserialize(&sample_manifest()).unwrap();
        assert!(!root.has_node("old"));
        assert!(root.has_node("top.json"));
    }

    #[test]
    fn test_deserialize_keeps_root_name() {
        let mut root = Node::root();
        root.deserialize(&json!({ "name": "x", "type": "directory" })).unwrap();
        assert!(root.is_root());
        assert_eq!(root.name(), ROOT_NAME);

        let mut dir = Node::directory("etc");
        dir.deserialize(&json!({ "name": "x", "type": "directory" })).unwrap();
        assert_eq!(dir.name(), "x");
    }

    #[test]
    fn test_deserialize_failures() {
        let mut root = Node::root();
        root.add_child(file_with("keep", &[1])).unwrap();

        for bad in [
            json!("ROOT"),
            json!({ "type": "directory" }),
            json!({ "name": "ROOT" }),
            json!({ "name": "ROOT", "type": "socket" }),
            json!({ "name": "ROOT", "type": "directory", "files": [] }),
            json!({ "name": "x", "type": "file", "resource": {} }),
            json!({ "name": "ROOT", "type": "file", "resource": [] }),
        ] {
            assert!(root.deserialize(&bad).unwrap_err().is_invalid_input(), "{bad}");
        }
        assert!(root.has_node("keep"));
    }

    #[test]
    fn test_legacy_file_tags() {
        let manifest = json!({
            "name": "f.txt",
            "type": "packagefile",
            "resource": [
                { "version": "1", "descriptor": { "type": "packagefile", "path": "/f.txt" } }
            ]
        });
        let node = Node::from_manifest(&manifest).unwrap();
        assert!(node.is_file());
        assert_eq!(node.latest().unwrap().version(), v(1));
    }

    #[test]
    fn test_get_all_files() {
        let mut root = Node::root();
        root.add_child(file_with("app.conf", &[1])).unwrap();
        root.add_child(file_with("readme.txt", &[1])).unwrap();
        let mut sub = Node::directory("sub");
        sub.add_child(file_with("db.conf", &[1])).unwrap();
        sub.add_child(file_with("schema.proto", &[1])).unwrap();
        root.add_child(sub).unwrap();

        let names = |files: Vec<&Node>| files.iter().map(|n| n.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(root.get_all_files(false, None)), vec!["app.conf", "readme.txt"]);
        assert_eq!(names(root.get_all_files(true, Some(".conf"))), vec!["app.conf", "db.conf"]);
        assert_eq!(names(root.get_all_files(true, Some(".proto"))), vec!["schema.proto"]);
        assert_eq!(root.get_all_files(true, None).len(), 4);
    }

    #[test]
    fn test_populate_from_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/deep")).unwrap();
        fs::write(dir.path().join("a/x.txt"), "x").unwrap();
        fs::write(dir.path().join("a/deep/y.yaml"), "k: v").unwrap();
        fs::write(dir.path().join("top.bin"), [0u8, 1, 2]).unwrap();

        let mut root = Node::root();
        root.populate_from_directory(dir.path()).unwrap();

        assert!(root.get_node("a").unwrap().is_dir());
        assert!(root.get_node("a/deep").unwrap().is_dir());
        let x = root.get_node("a/x.txt").unwrap();
        assert!(x.is_file());
        assert_eq!(x.num_resources(), 1);
        let latest = x.latest().unwrap();
        assert!(latest.version().is_latest());
        assert_eq!(latest.descriptor().location(), dir.path().join("a/x.txt").display().to_string());
        assert!(root.has_node("a/deep/y.yaml"));
        assert!(root.has_node("top.bin"));
    }

    #[test]
    fn test_populate_file_node_fails() {
        let dir = TempDir::new().unwrap();
        let mut file = Node::file("f").unwrap();
        assert!(file.populate_from_directory(dir.path()).unwrap_err().is_runtime());
    }

    #[test]
    fn test_bind_package_and_resolve_paths() {
        let mut root = Node::from_manifest(&sample_manifest()).unwrap();
        root.bind_package(Path::new("/opt/base.pkg"), 64);
        let file1 = root.get_node("directory1/file1.txt").unwrap();
        assert_eq!(
            file1.latest().unwrap().descriptor().package_path(),
            Some(Path::new("/opt/base.pkg"))
        );
        assert_eq!(file1.resources()[1].descriptor().package_path(), None);
        assert!(matches!(
            file1.latest().unwrap().descriptor(),
            Descriptor::PackageFile(d) if d.max_members() == 64
        ));

        let mut rel = Node::file("r").unwrap();
        rel.add_resource(local(v(1), "conf/r.json"), false).unwrap();
        rel.add_resource(Resource::new(v(2), PackageFile::new("r.json")), false).unwrap();
        rel.resolve_local_paths(Path::new("/base"));
        assert_eq!(rel.resources()[1].descriptor().location(), "/base/conf/r.json");
    }
}
