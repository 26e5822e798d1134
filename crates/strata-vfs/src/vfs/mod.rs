//! Virtual, versioned file namespace.
//!
//! Content from plain directories and tar packages is merged into one tree
//! of [`Node`]s. File nodes hold versioned [`Resource`]s whose content is
//! loaded lazily through a [`Connector`]. Key components:
//!
//! - [`Vfs`] - Root coordinator, owns the tree and registers sources
//! - [`Node`] - Directory or file node, with layered merge rules
//! - [`Package`] - Tar archive ingestion via an embedded `.vfs` manifest
//! - [`VfsApi`] - Trait collaborators depend on
//!
//! ## Design Decisions
//!
//! - **Lazy content**: nothing is read during registration except manifests.
//!   A resource loads and memoizes its content on first access.
//! - **First registered wins**: when two sources define the same version of
//!   a file, the one registered first is kept. Filesystem sources use the
//!   `LATEST` version, which outranks every numbered version.
//! - **All-or-nothing registration**: a source is parsed into a detached
//!   subtree and checked for kind conflicts before it touches the root.
//! - **Single-threaded**: there is no internal locking; callers serialize
//!   access to the tree.

mod connector;
mod content;
mod descriptor;
mod error;
mod node;
mod ops;
mod package;
mod resource;
mod tree;
mod version;

pub use connector::{Connector, LocalFileConnector, PackageFileConnector};
pub use content::{
    Content, MIME_BINARY, MIME_JSON, MIME_TAR, MIME_TEXT, MIME_YAML, decode, sniff_content_type,
};
pub use descriptor::{Descriptor, LOCAL_FILE_TAG, LocalFile, PACKAGE_FILE_TAG, PackageFile};
pub use error::{VfsError, VfsResult};
pub use node::{DIRECTORY_TAG, FILE_TAG, Node, NodeType, ROOT_NAME};
pub use ops::VfsApi;
pub use package::{DEFAULT_MAX_ARCHIVE_MEMBERS, MANIFEST_NAME, Package};
pub use resource::Resource;
pub use tree::Vfs;
pub use version::{LATEST_TAG, ResourceVersion};
