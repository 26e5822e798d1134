//! # strata-vfs
//!
//! A virtual, versioned file namespace layered from plain directories and
//! tar packages.
//!
//! Sources are registered in order and merged into one tree. Each file node
//! holds a list of versioned resources; content is read from disk or from
//! the owning archive only when it is first asked for.
//!
//! ```no_run
//! use strata_vfs::{Vfs, VfsResult};
//!
//! fn main() -> VfsResult<()> {
//!     let mut vfs = Vfs::new();
//!     vfs.register_source("/usr/share/app/base.pkg")?;
//!     vfs.register_source("~/.config/app")?;
//!
//!     if let Some(content) = vfs.get_content("conf/app.conf", None)? {
//!         println!("{content:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod conf_source;
pub mod config;
pub mod vfs;

pub use conf_source::ConfSource;
pub use config::{ConfigError, VfsConfig};
pub use vfs::{
    Content, Descriptor, LocalFile, Node, NodeType, Package, PackageFile, Resource,
    ResourceVersion, Vfs, VfsApi, VfsError, VfsResult,
};
