//! Resource connectors.
//!
//! A connector turns a [`Descriptor`] into [`Content`]. Connectors are
//! stateless; one is picked per descriptor variant by
//! [`Connector::for_descriptor`], and the match over variants is exhaustive.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::content::{Content, decode, sniff_content_type};
use super::descriptor::{Descriptor, LocalFile, PackageFile};
use super::error::{VfsError, VfsResult};
use super::package::read_member;
use crate::config::expand_path;

/// Loads files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileConnector;

impl LocalFileConnector {
    /// Load a local file. A missing file is reported as `None`.
    pub fn load(&self, descriptor: &LocalFile) -> VfsResult<Option<Content>> {
        let path = expand_path(descriptor.path());
        debug!(path = %path.display(), "loading local file");

        if !path.is_file() {
            warn!(path = %path.display(), "file does not exist in the local filesystem");
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let content_type = match descriptor.content_type() {
            Some(ct) => ct.to_string(),
            None => {
                let ct = sniff_content_type(&bytes, &path);
                debug!(path = %path.display(), content_type = %ct, "sniffed content type");
                descriptor.cache_content_type(&ct);
                ct
            }
        };

        debug!(path = %path.display(), content_type = %content_type, "decoding");
        decode(bytes, &content_type).map(Some)
    }
}

/// Loads members of tar packages.
///
/// Each load reopens the archive named by the descriptor's package path and
/// scans for the member, so nothing is held open between accesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageFileConnector;

impl PackageFileConnector {
    /// Load a package member. A missing archive or member is reported as `None`.
    pub fn load(&self, descriptor: &PackageFile) -> VfsResult<Option<Content>> {
        let Some(package_path) = descriptor.package_path() else {
            return Err(VfsError::runtime(format!(
                "package file {} is not bound to a package",
                descriptor.path()
            )));
        };
        let package_path = expand_path(package_path);
        debug!(
            package = %package_path.display(),
            member = descriptor.path(),
            "loading package file"
        );

        if !package_path.is_file() {
            warn!(package = %package_path.display(), "package does not exist");
            return Ok(None);
        }

        let Some(bytes) =
            read_member(&package_path, descriptor.path(), descriptor.max_members())?
        else {
            warn!(
                package = %package_path.display(),
                member = descriptor.path(),
                "member not found in package"
            );
            return Ok(None);
        };

        let content_type = match descriptor.content_type() {
            Some(ct) => ct.to_string(),
            None => {
                let ct = sniff_content_type(&bytes, Path::new(descriptor.path()));
                descriptor.cache_content_type(&ct);
                ct
            }
        };

        decode(bytes, &content_type).map(Some)
    }
}

/// Connector for one descriptor variant.
#[derive(Debug, Clone, Copy)]
pub enum Connector {
    LocalFile(LocalFileConnector),
    PackageFile(PackageFileConnector),
}

impl Connector {
    /// The connector that resolves `descriptor`.
    pub fn for_descriptor(descriptor: &Descriptor) -> Self {
        match descriptor {
            Descriptor::LocalFile(_) => Self::LocalFile(LocalFileConnector),
            Descriptor::PackageFile(_) => Self::PackageFile(PackageFileConnector),
        }
    }

    /// Load the content behind `descriptor`.
    ///
    /// Fails with `InvalidInput` if the descriptor belongs to another
    /// connector.
    pub fn load(&self, descriptor: &Descriptor) -> VfsResult<Option<Content>> {
        match (self, descriptor) {
            (Self::LocalFile(c), Descriptor::LocalFile(d)) => c.load(d),
            (Self::PackageFile(c), Descriptor::PackageFile(d)) => c.load(d),
            (_, d) => Err(VfsError::invalid_input(format!(
                "connector cannot load {} descriptors",
                d.tag()
            ))),
        }
    }
}
