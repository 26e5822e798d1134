//! Resource descriptors.
//!
//! A descriptor is the serializable pointer from a resource to its bytes.
//! On the wire it is a small map with a `type` discriminator:
//!
//! ```json
//! { "type": "localfile", "path": "/etc/app/app.conf" }
//! { "type": "packagefile", "path": "/conf/app.conf", "package_path": "/opt/app/base.pkg" }
//! ```
//!
//! Both variants carry an optional `contenttype` hint. Connectors fill it in
//! after sniffing, so the hint lives in a [`OnceCell`] that can be written
//! through a shared reference exactly once.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{VfsError, VfsResult};
use super::package::DEFAULT_MAX_ARCHIVE_MEMBERS;

/// Discriminator for [`LocalFile`] descriptors.
pub const LOCAL_FILE_TAG: &str = "localfile";

/// Discriminator for [`PackageFile`] descriptors.
pub const PACKAGE_FILE_TAG: &str = "packagefile";

/// A file in the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    path: PathBuf,
    content_type: OnceCell<String>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content_type: OnceCell::new(),
        }
    }

    /// Attach a content-type hint.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = OnceCell::from(content_type.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.get().map(String::as_str)
    }

    /// Record a sniffed content type. An existing hint is kept.
    pub fn cache_content_type(&self, content_type: &str) {
        let _ = self.content_type.set(content_type.to_string());
    }

    /// Parse a descriptor that must be a `localfile`.
    pub fn from_value(value: &Value) -> VfsResult<Self> {
        match Descriptor::from_value(value)? {
            Descriptor::LocalFile(d) => Ok(d),
            Descriptor::PackageFile(_) => Err(VfsError::invalid_input(format!(
                "expected a {LOCAL_FILE_TAG} descriptor, got: {value}"
            ))),
        }
    }
}

/// A file stored inside a tar package.
///
/// The archive member limit is not part of the wire shape; it is set when
/// the descriptor is bound to a registered package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    path: String,
    package_path: Option<PathBuf>,
    max_members: usize,
    content_type: OnceCell<String>,
}

impl PackageFile {
    /// Create a descriptor for `path` inside an archive that is not yet known.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package_path: None,
            max_members: DEFAULT_MAX_ARCHIVE_MEMBERS,
            content_type: OnceCell::new(),
        }
    }

    pub fn in_package(mut self, package_path: impl Into<PathBuf>) -> Self {
        self.package_path = Some(package_path.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = OnceCell::from(content_type.into());
        self
    }

    /// Path of the member inside the archive.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the archive on disk, once the package has been registered.
    pub fn package_path(&self) -> Option<&Path> {
        self.package_path.as_deref()
    }

    pub fn set_package_path(&mut self, package_path: impl Into<PathBuf>) {
        self.package_path = Some(package_path.into());
    }

    /// Upper bound on the archive entries scanned when reading the member.
    pub fn max_members(&self) -> usize {
        self.max_members
    }

    pub fn set_max_members(&mut self, max_members: usize) {
        self.max_members = max_members;
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.get().map(String::as_str)
    }

    /// Record a sniffed content type. An existing hint is kept.
    pub fn cache_content_type(&self, content_type: &str) {
        let _ = self.content_type.set(content_type.to_string());
    }

    /// Parse a descriptor that must be a `packagefile`.
    pub fn from_value(value: &Value) -> VfsResult<Self> {
        match Descriptor::from_value(value)? {
            Descriptor::PackageFile(d) => Ok(d),
            Descriptor::LocalFile(_) => Err(VfsError::invalid_input(format!(
                "expected a {PACKAGE_FILE_TAG} descriptor, got: {value}"
            ))),
        }
    }
}

/// Pointer to one physical resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDescriptor", into = "RawDescriptor")]
pub enum Descriptor {
    LocalFile(LocalFile),
    PackageFile(PackageFile),
}

impl Descriptor {
    /// The `type` discriminator.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::LocalFile(_) => LOCAL_FILE_TAG,
            Self::PackageFile(_) => PACKAGE_FILE_TAG,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::LocalFile(d) => d.content_type(),
            Self::PackageFile(d) => d.content_type(),
        }
    }

    /// Record a sniffed content type. An existing hint is kept.
    pub fn cache_content_type(&self, content_type: &str) {
        match self {
            Self::LocalFile(d) => d.cache_content_type(content_type),
            Self::PackageFile(d) => d.cache_content_type(content_type),
        }
    }

    /// The package path of a package file, if any.
    pub fn package_path(&self) -> Option<&Path> {
        match self {
            Self::LocalFile(_) => None,
            Self::PackageFile(d) => d.package_path(),
        }
    }

    /// Human-readable location for log messages.
    pub fn location(&self) -> String {
        match self {
            Self::LocalFile(d) => d.path.display().to_string(),
            Self::PackageFile(d) => match &d.package_path {
                Some(pkg) => format!("{}:{}", pkg.display(), d.path),
                None => format!("<unbound package>:{}", d.path),
            },
        }
    }

    /// Serialize to the descriptor map.
    pub fn to_value(&self) -> Value {
        // Paths that are not UTF-8 fall back to a lossy rendering.
        serde_json::to_value(self).unwrap_or_else(|_| {
            let mut map = serde_json::Map::new();
            map.insert("type".into(), Value::from(self.tag()));
            map.insert("path".into(), Value::from(self.location()));
            Value::Object(map)
        })
    }

    /// Parse a descriptor map of either variant.
    pub fn from_value(value: &Value) -> VfsResult<Self> {
        let Some(map) = value.as_object() else {
            return Err(VfsError::invalid_input(format!(
                "descriptor must be a map, got: {value}"
            )));
        };
        match map.get("type").and_then(Value::as_str) {
            Some(LOCAL_FILE_TAG) | Some(PACKAGE_FILE_TAG) => {}
            Some(other) => {
                return Err(VfsError::invalid_input(format!(
                    "unknown descriptor type {other:?}"
                )));
            }
            None => {
                return Err(VfsError::invalid_input(format!(
                    "descriptor has no type: {value}"
                )));
            }
        }
        serde_json::from_value(value.clone())
            .map_err(|e| VfsError::invalid_input(format!("failed to parse descriptor {value}: {e}")))
    }
}

impl From<LocalFile> for Descriptor {
    fn from(d: LocalFile) -> Self {
        Self::LocalFile(d)
    }
}

impl From<PackageFile> for Descriptor {
    fn from(d: PackageFile) -> Self {
        Self::PackageFile(d)
    }
}

/// Wire shape of a descriptor.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawDescriptor {
    LocalFile {
        path: PathBuf,
        #[serde(rename = "contenttype", default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    PackageFile {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package_path: Option<PathBuf>,
        #[serde(rename = "contenttype", default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
}

fn cell(content_type: Option<String>) -> OnceCell<String> {
    content_type.map(OnceCell::from).unwrap_or_default()
}

impl From<RawDescriptor> for Descriptor {
    fn from(raw: RawDescriptor) -> Self {
        match raw {
            RawDescriptor::LocalFile { path, content_type } => Self::LocalFile(LocalFile {
                path,
                content_type: cell(content_type),
            }),
            RawDescriptor::PackageFile {
                path,
                package_path,
                content_type,
            } => Self::PackageFile(PackageFile {
                path,
                package_path,
                max_members: DEFAULT_MAX_ARCHIVE_MEMBERS,
                content_type: cell(content_type),
            }),
        }
    }
}

impl From<Descriptor> for RawDescriptor {
    fn from(d: Descriptor) -> Self {
        match d {
            Descriptor::LocalFile(d) => RawDescriptor::LocalFile {
                path: d.path,
                content_type: d.content_type.into_inner(),
            },
            Descriptor::PackageFile(d) => RawDescriptor::PackageFile {
                path: d.path,
                package_path: d.package_path,
                content_type: d.content_type.into_inner(),
            },
        }
    }
}
